//! Chat-message synchronization.
//!
//! Messages ride the same append-only event log as the audit entries, under
//! the two chat event types. The message text has to be dug out of the
//! `value_after` payload, which the remote serves as either an array or a
//! bare object.

use chrono::Utc;

use crate::entity::message::Model;
use crate::policy::{self, EntityClass, FetchWindow};
use crate::record::{IdKind, RawRecord, RecordId};
use crate::store::messages as store;
use crate::sync::decode::{self, DecodeError};
use crate::sync::{batch, SyncContext, SyncError, SyncReport, DEFAULT_BATCH_SIZE};

const MESSAGE_TYPES: &str = "incoming_chat_message,outgoing_chat_message";
const DEFAULT_LOOKBACK_MONTHS: u32 = 12;

#[tracing::instrument(skip(ctx))]
pub async fn run(ctx: &SyncContext, full_sync: bool) -> Result<SyncReport, SyncError> {
    let watermark = if full_sync {
        None
    } else {
        store::max_event_at(&ctx.db).await?
    };
    let window = match watermark {
        Some(_) => FetchWindow::for_watermark(EntityClass::AppendOnly, watermark),
        None => FetchWindow::lookback(
            ctx.settings.messages_lookback_months,
            DEFAULT_LOOKBACK_MONTHS,
        ),
    };
    let Some(from) = window.from_ts() else {
        return Ok(SyncReport::default());
    };
    tracing::info!(from, "message sync window");

    let endpoint = format!(
        "events?filter[created_at][from]={from}&filter[type]={MESSAGE_TYPES}&order[created_at]=asc"
    );
    let mut stream = ctx
        .client
        .records(&endpoint, "events", IdKind::Str, ctx.cancel.clone());
    let mut report = SyncReport::default();
    let mut buffer: Vec<Model> = Vec::with_capacity(DEFAULT_BATCH_SIZE);

    while let Some(record) = stream.next().await? {
        report.processed += 1;
        match project(&record) {
            Ok(model) => buffer.push(model),
            Err(err) => {
                report.decode_errors += 1;
                tracing::error!(id = %record.id, error = %err, "undecodable message, skipping");
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
        "message sync finished"
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
        chat_id: chat_id(&root),
        author_id: decode::i64_or_zero(&root, "created_by"),
        text: message_text(&root),
        raw: record.raw.clone(),
        fingerprint: policy::fingerprint(&record.raw),
        event_at: decode::epoch(&root, "created_at").unwrap_or(now),
        checked_at: now,
    })
}

fn chat_id(root: &serde_json::Value) -> i64 {
    message_node(root)
        .and_then(|message| message.get("talk_id"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

/// `value_after[].message.text`, tolerating both the array and the bare
/// object form of `value_after`.
fn message_text(root: &serde_json::Value) -> String {
    message_node(root)
        .and_then(|message| message.get("text"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn message_node(root: &serde_json::Value) -> Option<&serde_json::Value> {
    let value_after = root.get("value_after")?;
    match value_after {
        serde_json::Value::Array(items) => {
            items.iter().rev().find_map(|item| item.get("message"))
        }
        serde_json::Value::Object(_) => value_after.get("message"),
        _ => None,
    }
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

    report.written += store::bulk_upsert(&ctx.db, changed, DEFAULT_BATCH_SIZE).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(body: serde_json::Value) -> RawRecord {
        RawRecord {
            id: RecordId::Str("msg-01".to_string()),
            raw: body.to_string(),
            page: 1,
        }
    }

    #[test]
    fn text_is_extracted_from_the_array_form() {
        let model = project(&record(json!({
            "id": "msg-01",
            "type": "incoming_chat_message",
            "entity_id": 7,
            "created_by": 11,
            "created_at": 1_704_844_800,
            "value_after": [{"message": {"text": "hello there", "talk_id": 99}}]
        })))
        .expect("project");
        assert_eq!(model.text, "hello there");
        assert_eq!(model.chat_id, 99);
        assert_eq!(model.author_id, 11);
    }

    #[test]
    fn text_is_extracted_from_the_object_form() {
        let model = project(&record(json!({
            "id": "msg-01",
            "type": "outgoing_chat_message",
            "value_after": {"message": {"text": "on my way"}}
        })))
        .expect("project");
        assert_eq!(model.text, "on my way");
        assert_eq!(model.chat_id, 0);
    }

    #[test]
    fn missing_payload_yields_an_empty_text() {
        let model = project(&record(json!({
            "id": "msg-01",
            "type": "incoming_chat_message"
        })))
        .expect("project");
        assert_eq!(model.text, "");
    }
}
