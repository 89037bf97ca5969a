//! Shared vocabulary: identity records, their encoding, and topic/key names.

pub mod record;
pub mod table;
pub mod topics;

pub use record::{display_from_key, normalize_key, IdentityRecord, RecordError, RecordLayout};
pub use table::render_table;
pub use topics::Topics;
