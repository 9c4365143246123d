//! Deal: a sales opportunity moving through a pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deals")]
pub struct Model {
    /// Source-system id; never regenerated locally.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    // ─── Source fields ──────────────────────────────────────────────
    pub name: String,
    pub price: i64,
    pub status_id: i64,
    pub pipeline_id: i64,
    pub loss_reason_id: Option<i64>,
    pub responsible_user_id: i64,
    pub account_id: i64,

    // ─── Sideloaded sub-documents (opaque JSON fragments) ───────────
    #[sea_orm(column_type = "Text", nullable)]
    pub contacts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub companies: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub tags: Option<String>,

    // ─── Mirror bookkeeping ─────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    pub fingerprint: String,
    pub source_updated_at: DateTimeUtc,
    pub source_created_at: DateTimeUtc,
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
