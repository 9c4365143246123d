//! Contact synchronization.

use chrono::Utc;

use crate::entity::contact::Model;
use crate::policy::{self, EntityClass, FetchWindow};
use crate::record::{IdKind, RawRecord, RecordId};
use crate::store::contacts as store;
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

    let mut endpoint = String::from("contacts");
    if let Some(from) = window.from_ts() {
        endpoint.push_str(&format!("?filter[updated_at][from]={from}"));
        tracing::info!(from, "incremental contact sync");
    } else {
        tracing::info!("full contact sync");
    }
    endpoint.push_str("&with=leads,companies,tags");
    if !endpoint.contains('?') {
        // No window filter; the expansion param opens the query string.
        endpoint = endpoint.replacen('&', "?", 1);
    }

    let mut stream = ctx
        .client
        .records(&endpoint, "contacts", IdKind::Int, ctx.cancel.clone());
    let mut report = SyncReport::default();
    let mut buffer: Vec<Model> = Vec::with_capacity(DEFAULT_BATCH_SIZE);

    while let Some(record) = stream.next().await? {
        report.processed += 1;
        match project(&record) {
            Ok(model) => buffer.push(model),
            Err(err) => {
                report.decode_errors += 1;
                tracing::error!(id = %record.id, error = %err, "undecodable contact, skipping");
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
        "contact sync finished"
    );
    Ok(report)
}

fn project(record: &RawRecord) -> Result<Model, DecodeError> {
    let RecordId::Int(id) = record.id else {
        return Err(DecodeError::IdKind);
    };
    let root: serde_json::Value = serde_json::from_str(&record.raw)?;
    let now = Utc::now();
    Ok(Model {
        id,
        name: decode::str_or_empty(&root, "name"),
        responsible_user_id: decode::i64_or_zero(&root, "responsible_user_id"),
        account_id: decode::i64_or_zero(&root, "account_id"),
        leads: decode::embedded_raw(&root, "leads"),
        companies: decode::embedded_raw(&root, "companies"),
        tags: decode::embedded_raw(&root, "tags"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_record(id: i64, body: serde_json::Value) -> RawRecord {
        RawRecord {
            id: RecordId::Int(id),
            raw: body.to_string(),
            page: 1,
        }
    }

    #[test]
    fn project_extracts_fields_and_sideloads() {
        let record = raw_record(
            7,
            json!({
                "id": 7,
                "name": "Acme Contact",
                "responsible_user_id": 11,
                "account_id": 3,
                "updated_at": 1_704_844_800,
                "created_at": 1_700_000_000,
                "_embedded": {"tags": [{"id": 1}], "leads": [{"id": 9}]}
            }),
        );
        let model = project(&record).expect("project");
        assert_eq!(model.id, 7);
        assert_eq!(model.name, "Acme Contact");
        assert_eq!(model.responsible_user_id, 11);
        assert_eq!(model.leads, Some("[{\"id\":9}]".to_string()));
        assert_eq!(model.companies, None);
        assert_eq!(model.source_updated_at.timestamp(), 1_704_844_800);
        assert_eq!(model.fingerprint, policy::fingerprint(&record.raw));
    }

    #[test]
    fn project_tolerates_sparse_records() {
        let record = raw_record(7, json!({"id": 7}));
        let model = project(&record).expect("project");
        assert_eq!(model.name, "");
        assert_eq!(model.responsible_user_id, 0);
        // Missing timestamps fall back to "now"; both ends stay consistent.
        assert!(model.source_updated_at <= Utc::now());
    }

    #[test]
    fn project_rejects_the_wrong_id_kind() {
        let record = RawRecord {
            id: RecordId::Str("7".to_string()),
            raw: "{}".to_string(),
            page: 1,
        };
        assert!(matches!(project(&record), Err(DecodeError::IdKind)));
    }
}
