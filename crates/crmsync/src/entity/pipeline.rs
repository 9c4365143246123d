//! Pipeline: a sales funnel definition, including its statuses.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pipelines")]
pub struct Model {
    /// Source-system id; never regenerated locally.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub name: String,
    pub sort: i32,
    pub is_main: bool,
    /// Status list, kept as the source's own JSON.
    #[sea_orm(column_type = "Text", nullable)]
    pub statuses: Option<String>,

    // ─── Mirror bookkeeping ─────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    pub fingerprint: String,
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
