//! Pipeline persistence. Small catalog table, always fully refreshed.

use std::collections::HashMap;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};

use crate::entity::pipeline::{ActiveModel, Column, Entity as Pipeline, Model};

use super::{insert_chunk_with_retry, Result};

fn upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::Id)
        .update_columns([
            Column::Name,
            Column::Sort,
            Column::IsMain,
            Column::Statuses,
            Column::Raw,
            Column::Fingerprint,
            Column::CheckedAt,
        ])
        .to_owned()
}

fn into_active(model: Model) -> ActiveModel {
    ActiveModel {
        id: Set(model.id),
        name: Set(model.name),
        sort: Set(model.sort),
        is_main: Set(model.is_main),
        statuses: Set(model.statuses),
        raw: Set(model.raw),
        fingerprint: Set(model.fingerprint),
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
        written += insert_chunk_with_retry(db, active, upsert_on_conflict(), "pipelines").await?;
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
    let rows: Vec<(i64, String)> = Pipeline::find()
        .select_only()
        .column(Column::Id)
        .column(Column::Fingerprint)
        .filter(Column::Id.is_in(ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}
