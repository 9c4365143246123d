//! Contact: a person record from the CRM.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
    /// Source-system id; never regenerated locally.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    // ─── Source fields ──────────────────────────────────────────────
    pub name: String,
    pub responsible_user_id: i64,
    pub account_id: i64,

    // ─── Sideloaded sub-documents (opaque JSON fragments) ───────────
    #[sea_orm(column_type = "Text", nullable)]
    pub leads: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub companies: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub tags: Option<String>,

    // ─── Mirror bookkeeping ─────────────────────────────────────────
    /// Verbatim source payload, kept for audit and replay.
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    /// SHA-256 of `raw`; equality means no write is needed.
    pub fingerprint: String,
    /// Update instant reported by the source; the incremental watermark.
    pub source_updated_at: DateTimeUtc,
    pub source_created_at: DateTimeUtc,
    /// When this mirror last confirmed the record.
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
