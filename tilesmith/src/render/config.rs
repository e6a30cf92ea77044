//! Layer configuration and zoom clamping.

use serde_json::Value;

/// A renderer layer configuration.
///
/// The document is carried as raw JSON so that every field the renderer
/// understands survives untouched; the pipeline only rewrites per-layer
/// `minzoom`/`maxzoom` bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    doc: Value,
}

impl RenderConfig {
    /// Parse a configuration document from JSON text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let doc = serde_json::from_str(text)?;
        Ok(Self { doc })
    }

    /// Clamp every layer's zoom bounds into `[min_zoom, max_zoom]`.
    ///
    /// A bound below the window is raised, a bound above it is lowered,
    /// and a layer lacking a bound is left unchanged for that field.
    pub fn clamp_zoom(&mut self, min_zoom: u8, max_zoom: u8) {
        let layers = match self.doc.get_mut("layers").and_then(Value::as_array_mut) {
            Some(layers) => layers,
            None => return,
        };

        for layer in layers {
            if let Some(v) = layer.get("minzoom").and_then(Value::as_u64) {
                layer["minzoom"] = Value::from(v.max(u64::from(min_zoom)));
            }
            if let Some(v) = layer.get("maxzoom").and_then(Value::as_u64) {
                layer["maxzoom"] = Value::from(v.min(u64::from(max_zoom)));
            }
        }
    }

    /// Serialize the configuration as pretty-printed JSON with a
    /// trailing newline.
    pub fn to_json_pretty(&self) -> String {
        let mut text = serde_json::to_string_pretty(&self.doc)
            .expect("serde_json::Value serialization cannot fail");
        text.push('\n');
        text
    }

    /// The `(minzoom, maxzoom)` bounds of every layer, in order.
    ///
    /// `None` marks an absent bound.
    pub fn layer_zooms(&self) -> Vec<(Option<u64>, Option<u64>)> {
        self.doc
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .map(|layer| {
                        (
                            layer.get("minzoom").and_then(Value::as_u64),
                            layer.get("maxzoom").and_then(Value::as_u64),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
