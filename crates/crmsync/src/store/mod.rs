//! Keyed persistence boundary.
//!
//! One module per entity type, each exposing the same narrow surface:
//! `bulk_upsert` (single `INSERT … ON CONFLICT (id) DO UPDATE` per chunk),
//! `fingerprints` for change detection, and the watermark query the type's
//! incremental window anchors on. The schema is owned elsewhere; this layer
//! only reads and upserts by key.

pub mod contacts;
pub mod deals;
pub mod events;
pub mod messages;
pub mod pipelines;
pub mod task_types;
pub mod tasks;
pub mod users;

use std::time::Duration;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const UPSERT_RETRIES: u32 = 3;
const UPSERT_BACKOFF_MS: u64 = 100;

/// Transient failures worth retrying: lock contention, busy handles,
/// timeouts, connection hiccups.
fn is_retryable_db_error(err: &DbErr) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("locked")
        || message.contains("busy")
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("connection")
}

/// Insert one chunk with the given conflict action, retrying transient
/// errors with exponential backoff. Returns the chunk size on success.
async fn insert_chunk_with_retry<A>(
    db: &DatabaseConnection,
    chunk: Vec<A>,
    on_conflict: OnConflict,
    table: &'static str,
) -> Result<u64>
where
    A: ActiveModelTrait + Clone + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    let mut attempt: u32 = 0;
    let mut backoff_ms = UPSERT_BACKOFF_MS;
    loop {
        let insert = <A::Entity as EntityTrait>::insert_many(chunk.clone())
            .on_conflict(on_conflict.clone());
        match insert.exec_without_returning(db).await {
            Ok(_) => return Ok(chunk.len() as u64),
            Err(err) if is_retryable_db_error(&err) && attempt < UPSERT_RETRIES => {
                attempt += 1;
                tracing::warn!(
                    table,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "transient database error, retrying upsert"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
