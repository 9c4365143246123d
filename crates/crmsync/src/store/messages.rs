//! Chat-message persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};

use crate::entity::message::{ActiveModel, Column, Entity as Message, Model};

use super::{insert_chunk_with_retry, Result};

fn upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::Id)
        .update_columns([
            Column::EventType,
            Column::EntityId,
            Column::ChatId,
            Column::AuthorId,
            Column::Text,
            Column::Raw,
            Column::Fingerprint,
            Column::EventAt,
            Column::CheckedAt,
        ])
        .to_owned()
}

fn into_active(model: Model) -> ActiveModel {
    ActiveModel {
        id: Set(model.id),
        event_type: Set(model.event_type),
        entity_id: Set(model.entity_id),
        chat_id: Set(model.chat_id),
        author_id: Set(model.author_id),
        text: Set(model.text),
        raw: Set(model.raw),
        fingerprint: Set(model.fingerprint),
        event_at: Set(model.event_at),
        checked_at: Set(model.checked_at),
    }
}

/// Upsert a batch keyed on the source id, chunked at `chunk_size`.
pub async fn bulk_upsert(
    db: &DatabaseConnection,
    models: Vec<Model>,
    chunk_size: usize,
) -> Result<u64> {
    if models.is_empty() {
        return Ok(0);
    }
    let mut written = 0;
    for chunk in models.chunks(chunk_size.max(1)) {
        let active: Vec<ActiveModel> = chunk.iter().cloned().map(into_active).collect();
        written += insert_chunk_with_retry(db, active, upsert_on_conflict(), "messages").await?;
    }
    Ok(written)
}

/// Stored fingerprints for the given ids.
pub async fn fingerprints(
    db: &DatabaseConnection,
    ids: &[String],
) -> Result<HashMap<String, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(String, String)> = Message::find()
        .select_only()
        .column(Column::Id)
        .column(Column::Fingerprint)
        .filter(Column::Id.is_in(ids.iter().cloned()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Newest message instant across the stored log.
pub async fn max_event_at(db: &DatabaseConnection) -> Result<Option<DateTime<Utc>>> {
    let max: Option<Option<DateTime<Utc>>> = Message::find()
        .select_only()
        .expr(Expr::col(Column::EventAt).max())
        .into_tuple()
        .one(db)
        .await?;
    Ok(max.flatten())
}
