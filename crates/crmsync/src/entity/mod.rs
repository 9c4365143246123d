//! sea-orm entities for the mirrored CRM record catalog.
//!
//! Every table keys on the source system's own id and carries the verbatim
//! payload (`raw`), its SHA-256 `fingerprint` for change detection, and the
//! source-side timestamps the incremental windows anchor on.

pub mod contact;
pub mod deal;
pub mod event;
pub mod message;
pub mod pipeline;
pub mod prelude;
pub mod task;
pub mod task_type;
pub mod user;
