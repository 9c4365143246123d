//! Event-log synchronization.
//!
//! The remote's event log is append-only: entries never change once written,
//! so the window anchors on the newest stored `event_at` with only a
//! one-second rewind. First runs are bounded by a configurable lookback
//! instead of crawling the account's entire history.

use chrono::Utc;

use crate::entity::event::Model;
use crate::policy::{self, EntityClass, FetchWindow};
use crate::record::{IdKind, RawRecord, RecordId};
use crate::store::events as store;
use crate::sync::decode::{self, DecodeError};
use crate::sync::{batch, SyncContext, SyncError, SyncReport, EVENT_BATCH_SIZE};

/// Event kinds worth mirroring; chat messages have their own sync.
const EVENT_TYPES: &str = "lead_added,lead_deleted,lead_restored,lead_status_changed,lead_linked,lead_unlinked,\
contact_added,contact_deleted,contact_restored,contact_linked,contact_unlinked,\
company_added,company_deleted,company_restored,company_linked,company_unlinked,\
task_added,task_deleted,task_completed,task_type_changed,task_text_changed,task_deadline_changed,\
entity_tag_added,entity_tag_deleted,entity_linked,entity_unlinked,entity_merged,sale_field_changed,\
common_note_added,common_note_deleted";

/// Zero in the settings still has to mean "some history, not all of it".
const MIN_LOOKBACK_MONTHS: u32 = 1;

#[tracing::instrument(skip(ctx))]
pub async fn run(ctx: &SyncContext, full_sync: bool) -> Result<SyncReport, SyncError> {
    let watermark = if full_sync {
        None
    } else {
        store::max_event_at(&ctx.db).await?
    };
    let window = match watermark {
        Some(_) => FetchWindow::for_watermark(EntityClass::AppendOnly, watermark),
        None => FetchWindow::lookback(ctx.settings.events_lookback_months, MIN_LOOKBACK_MONTHS),
    };
    let Some(from) = window.from_ts() else {
        // Lookback windows are always bounded; this arm never runs.
        return Ok(SyncReport::default());
    };
    tracing::info!(from, "event sync window");

    let endpoint = format!(
        "events?filter[created_at][from]={from}&filter[type]={EVENT_TYPES}&order[created_at]=asc"
    );
    let mut stream = ctx
        .client
        .records(&endpoint, "events", IdKind::Str, ctx.cancel.clone());
    let mut report = SyncReport::default();
    let mut buffer: Vec<Model> = Vec::with_capacity(EVENT_BATCH_SIZE);

    while let Some(record) = stream.next().await? {
        report.processed += 1;
        match project(&record) {
            Ok(model) => buffer.push(model),
            Err(err) => {
                report.decode_errors += 1;
                tracing::error!(id = %record.id, error = %err, "undecodable event, skipping");
            }
        }
        if buffer.len() >= EVENT_BATCH_SIZE {
            flush(ctx, &mut buffer, &mut report).await?;
        }
    }
    flush(ctx, &mut buffer, &mut report).await?;

    tracing::info!(
        processed = report.processed,
        written = report.written,
        unchanged = report.unchanged,
        decode_errors = report.decode_errors,
        "event sync finished"
    );
    Ok(report)
}

fn project(record: &RawRecord) -> Result<Model, DecodeError> {
    let RecordId::Str(ref id) = record.id else {
        return Err(DecodeError::IdKind);
    };
    let root: serde_json::Value = serde_json::from_str(&record.raw)?;
    let now = Utc::now();
    Ok(Model {
        id: id.clone(),
        event_type: decode::str_or_empty(&root, "type"),
        entity_id: decode::i64_or_zero(&root, "entity_id"),
        entity_type: decode::str_or_empty(&root, "entity_type"),
        created_by: decode::i64_or_zero(&root, "created_by"),
        value_before: decode::field_raw(&root, "value_before"),
        value_after: decode::field_raw(&root, "value_after"),
        raw: record.raw.clone(),
        fingerprint: policy::fingerprint(&record.raw),
        event_at: decode::epoch(&root, "created_at").unwrap_or(now),
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
    // The overlap window can repeat boundary entries inside one buffer.
    let batch = batch::dedup_last_wins(batch, |m| m.id.clone());
    let before = batch.len();

    let ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();
    let existing = store::fingerprints(&ctx.db, &ids).await?;
    let changed = batch::retain_changed(
        batch,
        &existing,
        |m| m.id.clone(),
        |m| m.fingerprint.as_str(),
    );
    report.unchanged += (before - changed.len()) as u64;

    report.written += store::bulk_upsert(&ctx.db, changed, EVENT_BATCH_SIZE).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_keeps_change_payloads_verbatim() {
        let body = json!({
            "id": "ev-01",
            "type": "lead_status_changed",
            "entity_id": 42,
            "entity_type": "lead",
            "created_by": 11,
            "created_at": 1_704_844_800,
            "value_before": [{"lead_status": {"id": 1}}],
            "value_after": [{"lead_status": {"id": 2}}]
        });
        let record = RawRecord {
            id: RecordId::Str("ev-01".to_string()),
            raw: body.to_string(),
            page: 1,
        };
        let model = project(&record).expect("project");
        assert_eq!(model.event_type, "lead_status_changed");
        assert_eq!(model.entity_id, 42);
        assert_eq!(model.event_at.timestamp(), 1_704_844_800);
        assert_eq!(
            model.value_after,
            Some("[{\"lead_status\":{\"id\":2}}]".to_string())
        );
    }

    #[test]
    fn chat_messages_are_excluded_from_the_type_filter() {
        assert!(!EVENT_TYPES.contains("chat_message"));
    }
}
