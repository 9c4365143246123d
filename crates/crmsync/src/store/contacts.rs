//! Contact persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};

use crate::entity::contact::{ActiveModel, Column, Entity as Contact, Model};

use super::{insert_chunk_with_retry, Result};

fn upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::Id)
        .update_columns([
            Column::Name,
            Column::ResponsibleUserId,
            Column::AccountId,
            Column::Leads,
            Column::Companies,
            Column::Tags,
            Column::Raw,
            Column::Fingerprint,
            Column::SourceUpdatedAt,
            Column::SourceCreatedAt,
            Column::CheckedAt,
        ])
        .to_owned()
}

fn into_active(model: Model) -> ActiveModel {
    ActiveModel {
        id: Set(model.id),
        name: Set(model.name),
        responsible_user_id: Set(model.responsible_user_id),
        account_id: Set(model.account_id),
        leads: Set(model.leads),
        companies: Set(model.companies),
        tags: Set(model.tags),
        raw: Set(model.raw),
        fingerprint: Set(model.fingerprint),
        source_updated_at: Set(model.source_updated_at),
        source_created_at: Set(model.source_created_at),
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
        written += insert_chunk_with_retry(db, active, upsert_on_conflict(), "contacts").await?;
    }
    Ok(written)
}

/// Stored fingerprints for the given ids.
pub async fn fingerprints(
    db: &DatabaseConnection,
    ids: &[i64],
) -> Result<HashMap<i64, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, String)> = Contact::find()
        .select_only()
        .column(Column::Id)
        .column(Column::Fingerprint)
        .filter(Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Newest source-side update across all stored contacts.
pub async fn max_source_updated_at(db: &DatabaseConnection) -> Result<Option<DateTime<Utc>>> {
    let max: Option<Option<DateTime<Utc>>> = Contact::find()
        .select_only()
        .expr(Expr::col(Column::SourceUpdatedAt).max())
        .into_tuple()
        .one(db)
        .await?;
    Ok(max.flatten())
}
