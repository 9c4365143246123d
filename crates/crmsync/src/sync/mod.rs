//! Per-entity sync orchestrators.
//!
//! Each submodule owns one entity type end to end: derive the incremental
//! window from the store, stream or fetch the remote listing, project wire
//! records into models, skip unchanged ones by fingerprint, and bulk-upsert
//! the rest. Shared plumbing lives in [`batch`] and [`decode`].

pub mod batch;
pub mod contacts;
pub mod deals;
mod decode;
pub mod events;
pub mod messages;
pub mod pipelines;
pub mod task_types;
pub mod tasks;
pub mod users;

use std::fmt;
use std::str::FromStr;

use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::client::CrmClient;
use crate::settings::SyncSettings;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Flush threshold for the in-memory write buffer.
pub const DEFAULT_BATCH_SIZE: usize = 250;
/// Events arrive in bulk; a larger buffer keeps the write count down.
pub const EVENT_BATCH_SIZE: usize = 500;
/// Catalog tables are tiny; keep their chunks small.
pub const CATALOG_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote kept throttling after every retry.
    #[error("throttled by the CRM API after retries (HTTP {status})")]
    ThrottleExhausted { status: u16 },

    /// A genuine permission failure, not throttling in disguise.
    #[error("authorization rejected by the CRM API: {message}")]
    Authorization { message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("CRM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A bulk write failed; the run aborts rather than silently dropping
    /// records.
    #[error("bulk write failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Shared dependencies for one sync run. Orchestrators borrow it; nothing
/// needs an owned copy.
pub struct SyncContext {
    pub db: DatabaseConnection,
    pub client: CrmClient,
    pub settings: SyncSettings,
    pub cancel: CancellationToken,
}

/// Outcome counters for one orchestrator run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Records pulled from the remote.
    pub processed: u64,
    /// Skipped because the stored fingerprint already matched.
    pub unchanged: u64,
    /// Skipped because the payload would not decode.
    pub decode_errors: u64,
    /// Rows actually upserted.
    pub written: u64,
}

impl SyncReport {
    pub fn absorb(&mut self, other: SyncReport) {
        self.processed += other.processed;
        self.unchanged += other.unchanged;
        self.decode_errors += other.decode_errors;
        self.written += other.written;
    }
}

/// The entity types this mirror knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Contacts,
    Deals,
    Tasks,
    Events,
    Messages,
    Pipelines,
    TaskTypes,
    Users,
}

impl EntityKind {
    /// Catalog types first so foreign references resolve when the record
    /// types land.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Users,
        EntityKind::Pipelines,
        EntityKind::TaskTypes,
        EntityKind::Contacts,
        EntityKind::Deals,
        EntityKind::Tasks,
        EntityKind::Events,
        EntityKind::Messages,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Contacts => "contacts",
            EntityKind::Deals => "deals",
            EntityKind::Tasks => "tasks",
            EntityKind::Events => "events",
            EntityKind::Messages => "messages",
            EntityKind::Pipelines => "pipelines",
            EntityKind::TaskTypes => "task-types",
            EntityKind::Users => "users",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contacts" => Ok(EntityKind::Contacts),
            "deals" | "leads" => Ok(EntityKind::Deals),
            "tasks" => Ok(EntityKind::Tasks),
            "events" => Ok(EntityKind::Events),
            "messages" => Ok(EntityKind::Messages),
            "pipelines" => Ok(EntityKind::Pipelines),
            "task-types" | "task_types" => Ok(EntityKind::TaskTypes),
            "users" => Ok(EntityKind::Users),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Run one entity's orchestrator.
pub async fn run_entity(
    ctx: &SyncContext,
    kind: EntityKind,
    full_sync: bool,
) -> Result<SyncReport, SyncError> {
    match kind {
        EntityKind::Contacts => contacts::run(ctx, full_sync).await,
        EntityKind::Deals => deals::run(ctx, full_sync).await,
        EntityKind::Tasks => tasks::run(ctx, full_sync).await,
        EntityKind::Events => events::run(ctx, full_sync).await,
        EntityKind::Messages => messages::run(ctx, full_sync).await,
        EntityKind::Pipelines => pipelines::run(ctx).await,
        EntityKind::TaskTypes => task_types::run(ctx).await,
        EntityKind::Users => users::run(ctx).await,
    }
}
