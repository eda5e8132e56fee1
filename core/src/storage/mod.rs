//! Durable graph object storage.
//!
//! Records produced by steps are buffered per `(step, kind)` and flushed to
//! sharded batch files. A per-type manifest lets later steps discover every
//! batch holding a given `_type` without scanning all step output.
//!
//! ```text
//! <root>/graph/<step>/<entities|relationships>/<batch>.json
//! <root>/index/<entities|relationships>/<type>.manifest
//! <root>/summary.json
//! ```

mod key_tracker;
mod layout;
mod record;
mod store;
mod type_tracker;

pub use key_tracker::KeyUniquenessTracker;
pub use layout::{sanitize_segment, GRAPH_DIR, INDEX_DIR, SUMMARY_FILE};
pub use record::{BatchFile, Entity, Record, RecordClass, RecordKind, Relationship, RESERVED_FIELDS};
pub use store::{GraphObjectStore, DEFAULT_FLUSH_CONCURRENCY, DEFAULT_FLUSH_THRESHOLD};
pub use type_tracker::{TypeDiff, TypeTracker};
