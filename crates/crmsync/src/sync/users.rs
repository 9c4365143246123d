//! User synchronization. One request refreshes the whole member list.

use chrono::Utc;

use crate::entity::user::Model;
use crate::policy;
use crate::record::{IdKind, RecordId};
use crate::store::users as store;
use crate::sync::decode;
use crate::sync::{batch, SyncContext, SyncError, SyncReport, CATALOG_BATCH_SIZE};

#[tracing::instrument(skip(ctx))]
pub async fn run(ctx: &SyncContext) -> Result<SyncReport, SyncError> {
    let items = ctx.client.catalog_items("users", "users").await?;
    let mut report = SyncReport::default();
    let mut models: Vec<Model> = Vec::new();
    if items.is_empty() {
        tracing::info!("no users in the account");
        return Ok(report);
    }

    let now = Utc::now();
    for raw in items {
        report.processed += 1;
        let root: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(root) => root,
            Err(err) => {
                report.decode_errors += 1;
                tracing::error!(error = %err, "undecodable user, skipping");
                continue;
            }
        };
        let id = root
            .get("id")
            .and_then(|value| RecordId::from_json(value, IdKind::Int))
            .and_then(|id| id.as_int());
        let Some(id) = id else {
            report.decode_errors += 1;
            tracing::error!("user without usable id, skipping");
            continue;
        };
        models.push(Model {
            id,
            name: decode::str_or_empty(&root, "name"),
            email: decode::str_or_empty(&root, "email"),
            fingerprint: policy::fingerprint(&raw),
            raw,
            checked_at: now,
        });
    }

    let before = models.len();
    let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
    let existing = store::fingerprints(&ctx.db, &ids).await?;
    let changed = batch::retain_changed(models, &existing, |m| m.id, |m| m.fingerprint.as_str());
    report.unchanged += (before - changed.len()) as u64;

    report.written += store::bulk_upsert(&ctx.db, changed, CATALOG_BATCH_SIZE).await?;
    tracing::info!(
        processed = report.processed,
        written = report.written,
        unchanged = report.unchanged,
        "user sync finished"
    );
    Ok(report)
}
