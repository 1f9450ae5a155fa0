//! Theorem-card catalog with incremental fuzzy search and markup-safe
//! highlighting.
//!
//! The catalog is a fixed set of entries loaded once; queries are
//! tokenized, scored per field with substring and edit-distance heuristics,
//! and ranked with title > tags > description weighting. Highlighting runs
//! in two phases around the external typesetting engine so math notation is
//! never rewritten: literal text is marked before typesetting, and matches
//! that only surface in typeset output are wrapped afterwards.

pub mod app;
pub mod catalog;
pub mod dom;
pub mod highlight;
pub mod render;
pub mod search;
pub mod segment;

#[cfg(any(feature = "cli", feature = "web"))]
pub mod telemetry;
#[cfg(feature = "web")]
pub mod web;

pub use app::{DEBOUNCE_WINDOW, Debouncer, RenderTicket, RenderedView, SearchSession, SessionConfig};
pub use catalog::{Catalog, CatalogError, Entry};
pub use highlight::{TokenPatterns, highlight_segments};
pub use render::{Typesetter, TypesetError, UnicodeTypesetter};
pub use search::{Scored, normalize, rank, rank_scored, score_field};
pub use segment::Segment;
