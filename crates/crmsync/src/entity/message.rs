//! Message: a chat message, sourced from the event log's chat entries.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    /// Opaque string id assigned by the source's event log.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    // ─── Source fields ──────────────────────────────────────────────
    /// `incoming_chat_message` or `outgoing_chat_message`.
    pub event_type: String,
    /// The contact the conversation belongs to.
    pub entity_id: i64,
    pub chat_id: i64,
    pub author_id: i64,
    #[sea_orm(column_type = "Text")]
    pub text: String,

    // ─── Mirror bookkeeping ─────────────────────────────────────────
    #[sea_orm(column_type = "Text")]
    pub raw: String,
    pub fingerprint: String,
    /// When the message was sent; the incremental watermark.
    pub event_at: DateTimeUtc,
    pub checked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
