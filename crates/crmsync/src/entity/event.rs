//! Event: one append-only audit-log entry from the CRM.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    /// Opaque string id assigned by the source's event log.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    // ─── Source fields ──────────────────────────────────────────────
    pub event_type: String,
    /// The record the event happened to.
    pub entity_id: i64,
    pub entity_type: String,
    pub created_by: i64,

    // ─── Change payloads (opaque JSON fragments) ────────────────────
    #[sea_orm(column_type = "Text", nullable)]
    pub value_before: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub value_after: Option<String>,

    // ─── Mirror bookkeeping ─────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    pub fingerprint: String,
    /// When the event occurred; the incremental watermark for the log.
    pub event_at: DateTimeUtc,
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
