//! Path translation between the primary environment and the bridge.
//!
//! The bridge exposes primary-environment drives under a mount root, so
//! `C:\maps\out` becomes `/mnt/c/maps/out`. Translation is a pure
//! function so it can be tested without any process execution.

use std::path::Path;

/// Default mount root used by the bridge for primary-environment drives.
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt";

/// Translate a primary-environment path into its bridge equivalent.
///
/// - A leading drive letter (`X:`) becomes `<mount_root>/<x>`.
/// - Backslash separators are normalized to forward slashes.
/// - Paths without a drive letter only get separator normalization.
pub fn translate_path(path: &Path, mount_root: &str) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");

    let mut chars = raw.chars();
    let (drive, rest) = match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            (Some(letter.to_ascii_lowercase()), chars.as_str())
        }
        _ => (None, raw.as_str()),
    };

    match drive {
        Some(letter) => {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                format!("{}/{}", mount_root, letter)
            } else {
                format!("{}/{}/{}", mount_root, letter, rest)
            }
        }
        None => rest.to_string(),
    }
}
