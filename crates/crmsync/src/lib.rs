//! crmsync keeps a local, queryable mirror of a remote CRM's record catalog.
//!
//! The remote enforces a hard request-rate ceiling and answers excess
//! traffic with 429s, so everything funnels through one shared
//! [`throttle::RateGovernor`] and a retrying [`transport::ResilientTransport`].
//! On top of that sit a paginated [`client::RecordStream`] and one sync
//! orchestrator per entity type, which skip unchanged records by SHA-256
//! fingerprint and bulk-upsert the rest keyed on the source system's own ids.
//!
//! Typical wiring:
//!
//! ```ignore
//! let db = crmsync::connect_and_migrate("sqlite://crm.db").await?;
//! let governor = RateGovernor::default();
//! let transport = ResilientTransport::new(
//!     Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?),
//!     governor,
//! );
//! let client = CrmClient::new(transport, Arc::new(StaticToken(token)), options);
//! let ctx = SyncContext { db, client, settings, cancel };
//! let report = sync::run_entity(&ctx, EntityKind::Contacts, false).await?;
//! ```

pub mod client;
pub mod db;
pub mod entity;
pub mod http;
pub mod migration;
pub mod policy;
pub mod record;
pub mod settings;
pub mod store;
pub mod sync;
pub mod throttle;
pub mod transport;

pub use client::{CrmClient, RecordStream};
pub use db::{connect, connect_and_migrate};
pub use record::{IdKind, RawRecord, RecordId};
pub use settings::{CredentialsProvider, CrmOptions, StaticToken, SyncSettings};
pub use sync::{EntityKind, SyncContext, SyncError, SyncReport};
pub use throttle::{GovernorSettings, GovernorStatus, RateGovernor, ThrottleState};
pub use transport::{ResilientTransport, TransportError};
