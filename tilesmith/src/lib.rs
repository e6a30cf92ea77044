//! Tilesmith - map-tile archive builds from OpenStreetMap extracts
//!
//! This library drives the full build pipeline for distributable map-tile
//! archives: it fetches regional OpenStreetMap extracts and auxiliary
//! datasets, renders them into tiled archives with an external renderer,
//! converts the result to PMTiles, and publishes a manifest describing
//! the outputs.
//!
//! The pipeline is deliberately sequential and resumable: every stage
//! persists its result as a file on disk, and a re-run skips any stage
//! whose output already exists.

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod datasets;
pub mod fetch;
pub mod integrity;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod render;
pub mod stage;
