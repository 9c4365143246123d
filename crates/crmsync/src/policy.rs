//! Content fingerprinting and incremental-window derivation.

use chrono::{DateTime, Duration, Months, Utc};
use sha2::{Digest, Sha256};

/// Lowercase-hex SHA-256 of a record's verbatim payload.
///
/// Empty input hashes to the empty string so a missing payload never
/// collides with a real one.
#[must_use]
pub fn fingerprint(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// How an entity type anchors its incremental window.
///
/// Mutable records can be edited long after creation, so their window is
/// rewound generously to absorb clock skew and slow writers on the remote.
/// Append-only log entries never change; a one-second rewind covers
/// boundary duplicates and nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    Mutable,
    AppendOnly,
}

impl EntityClass {
    fn safety_overlap(self) -> Duration {
        match self {
            EntityClass::Mutable => Duration::minutes(5),
            EntityClass::AppendOnly => Duration::seconds(1),
        }
    }
}

/// What slice of the remote catalog a sync run asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// Everything; used for first runs and forced full syncs.
    Full,
    /// Records changed at or after the instant.
    From(DateTime<Utc>),
}

impl FetchWindow {
    /// Derive the window from the store's high-water mark.
    #[must_use]
    pub fn for_watermark(class: EntityClass, watermark: Option<DateTime<Utc>>) -> FetchWindow {
        match watermark {
            Some(mark) => FetchWindow::From(mark - class.safety_overlap()),
            None => FetchWindow::Full,
        }
    }

    /// First-run window for append-only logs: bounded by a lookback instead
    /// of fetching years of history. A zero lookback falls back to the
    /// type's default.
    #[must_use]
    pub fn lookback(months: u32, default_months: u32) -> FetchWindow {
        let months = if months == 0 { default_months } else { months };
        let from = Utc::now()
            .checked_sub_months(Months::new(months))
            .unwrap_or_else(Utc::now);
        FetchWindow::From(from)
    }

    /// Unix-seconds lower bound, if any, for `filter[...][from]` params.
    #[must_use]
    pub fn from_ts(&self) -> Option<i64> {
        match self {
            FetchWindow::Full => None,
            FetchWindow::From(t) => Some(t.timestamp()),
        }
    }
}
