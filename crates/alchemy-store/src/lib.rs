//! SQLite persistence for Daily Alchemy combinations.
//!
//! One `combinations` table keyed by the normalized pair key, plus a
//! `canonical_glyphs` table that pins the glyph of every result name.

pub mod elements;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;

pub use elements::{
    ElementDetail, ElementPage, ElementQuery, ElementSummary, Recipe, StoreStats, Usage,
};
pub use error::{Result, StoreError};
pub use json_bridge::{ExportFile, ImportReport};
pub use store::{ElementChange, InsertOutcome, Store};
