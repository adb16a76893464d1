//! Gauge image catalog
//!
//! Scans folders of gauge-camera images into a single-table SQLite catalog
//! and runs the external line-finder binary over individual images.

pub mod config;
pub mod error;
pub mod linefind;
pub mod logging;
pub mod scan;
pub mod state;

pub use error::CatalogError;
pub use linefind::{Invocation, LineFindError, LineFindItem, LineFinder, TimestampSource};
pub use state::data::{CatalogEntry, InitReport};
pub use state::registry::Registry;
