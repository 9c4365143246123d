//! Task synchronization.

use chrono::Utc;

use crate::entity::task::Model;
use crate::policy::{self, EntityClass, FetchWindow};
use crate::record::{IdKind, RawRecord, RecordId};
use crate::store::tasks as store;
use crate::sync::decode::{self, DecodeError};
use crate::sync::{batch, SyncContext, SyncError, SyncReport, DEFAULT_BATCH_SIZE};

#[tracing::instrument(skip(ctx))]
pub async fn run(ctx: &SyncContext, full_sync: bool) -> Result<SyncReport, SyncError> {
    let window = if full_sync {
        FetchWindow::Full
    } else {
        FetchWindow::for_watermark(
            EntityClass::Mutable,
            store::max_source_updated_at(&ctx.db).await?,
        )
    };

    let mut endpoint = String::from("tasks");
    if let Some(from) = window.from_ts() {
        endpoint.push_str(&format!("?filter[updated_at][from]={from}"));
        tracing::info!(from, "incremental task sync");
    } else {
        tracing::info!("full task sync");
    }
    endpoint.push_str("&with=leads,companies,contacts");
    if !endpoint.contains('?') {
        endpoint = endpoint.replacen('&', "?", 1);
    }

    let mut stream = ctx
        .client
        .records(&endpoint, "tasks", IdKind::Int, ctx.cancel.clone());
    let mut report = SyncReport::default();
    let mut buffer: Vec<Model> = Vec::with_capacity(DEFAULT_BATCH_SIZE);

    while let Some(record) = stream.next().await? {
        report.processed += 1;
        match project(&record) {
            Ok(model) => buffer.push(model),
            Err(err) => {
                report.decode_errors += 1;
                tracing::error!(id = %record.id, error = %err, "undecodable task, skipping");
            }
        }
        if buffer.len() >= DEFAULT_BATCH_SIZE {
            flush(ctx, &mut buffer, &mut report).await?;
        }
    }
    flush(ctx, &mut buffer, &mut report).await?;

    tracing::info!(
        processed = report.processed,
        written = report.written,
        unchanged = report.unchanged,
        decode_errors = report.decode_errors,
        "task sync finished"
    );
    Ok(report)
}

fn project(record: &RawRecord) -> Result<Model, DecodeError> {
    let RecordId::Int(id) = record.id else {
        return Err(DecodeError::IdKind);
    };
    let root: serde_json::Value = serde_json::from_str(&record.raw)?;
    let now = Utc::now();
    let result_text = root
        .get("result")
        .and_then(|result| result.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    Ok(Model {
        id,
        text: decode::str_or_empty(&root, "text"),
        task_type_id: decode::i64_or_zero(&root, "task_type_id"),
        is_completed: decode::bool_or_false(&root, "is_completed"),
        complete_till: decode::epoch(&root, "complete_till"),
        result_text,
        responsible_user_id: decode::i64_or_zero(&root, "responsible_user_id"),
        account_id: decode::i64_or_zero(&root, "account_id"),
        leads: decode::embedded_raw(&root, "leads"),
        companies: decode::embedded_raw(&root, "companies"),
        contacts: decode::embedded_raw(&root, "contacts"),
        raw: record.raw.clone(),
        fingerprint: policy::fingerprint(&record.raw),
        source_updated_at: decode::epoch(&root, "updated_at").unwrap_or(now),
        source_created_at: decode::epoch(&root, "created_at").unwrap_or(now),
        checked_at: now,
    })
}

async fn flush(
    ctx: &SyncContext,
    buffer: &mut Vec<Model>,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    if buffer.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(buffer);
    let before = batch.len();

    let ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
    let existing = store::fingerprints(&ctx.db, &ids).await?;
    let changed = batch::retain_changed(batch, &existing, |m| m.id, |m| m.fingerprint.as_str());
    report.unchanged += (before - changed.len()) as u64;

    report.written += store::bulk_upsert(&ctx.db, changed, DEFAULT_BATCH_SIZE).await?;
    Ok(())
}
