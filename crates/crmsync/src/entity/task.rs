//! Task: a to-do attached to a lead, contact, or company.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    /// Source-system id; never regenerated locally.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    // ─── Source fields ──────────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    pub text: String,
    pub task_type_id: i64,
    pub is_completed: bool,
    pub complete_till: Option<DateTimeUtc>,
    /// Completion note, when the task has been closed with one.
    #[sea_orm(column_type = "Text", nullable)]
    pub result_text: Option<String>,
    pub responsible_user_id: i64,
    pub account_id: i64,

    // ─── Sideloaded sub-documents (opaque JSON fragments) ───────────
    #[sea_orm(column_type = "Text", nullable)]
    pub leads: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub companies: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub contacts: Option<String>,

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
