//! Process-wide request pacing for the CRM API.
//!
//! The remote service enforces a hard per-account ceiling of 7 requests per
//! second and answers excess traffic with 429s (or throttling 403s). The
//! [`RateGovernor`] keeps a sliding one-second window of send timestamps and
//! an adaptive extra delay that grows on every throttle signal and decays on
//! success, so sustained throttling slows the whole process down rather than
//! a single call site.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Hard ceiling imposed by the remote service.
pub const MAX_REQUESTS_PER_SECOND: u32 = 7;

/// Adaptive delay never exceeds this, so one bad stretch cannot park the
/// process for minutes.
pub const MAX_ADAPTIVE_DELAY_MS: f64 = 5_000.0;

const BACKOFF_MULTIPLIER: f64 = 1.5;
const RECOVERY_MULTIPLIER: f64 = 0.8;

/// Tunable governor settings, mutable at runtime via
/// [`RateGovernor::update_settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct GovernorSettings {
    /// Requests per second, clamped to `1..=MAX_REQUESTS_PER_SECOND`.
    pub max_requests_per_second: u32,
    /// Whether throttle signals grow an extra inter-request delay.
    pub adaptive: bool,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            max_requests_per_second: MAX_REQUESTS_PER_SECOND,
            adaptive: true,
        }
    }
}

impl GovernorSettings {
    fn clamped(mut self) -> Self {
        self.max_requests_per_second = self
            .max_requests_per_second
            .clamp(1, MAX_REQUESTS_PER_SECOND);
        self
    }

    /// Evenly-spread delay for the configured ceiling; doubles as the floor
    /// and the minimum inter-request gap.
    fn base_delay_ms(&self) -> f64 {
        1_000.0 / f64::from(self.max_requests_per_second)
    }
}

/// Qualitative pressure level, derived from consecutive throttle hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    Normal,
    Cautious,
    Throttled,
    Backoff,
}

impl ThrottleState {
    fn from_consecutive_hits(hits: u32) -> Self {
        match hits {
            0 => ThrottleState::Normal,
            1 => ThrottleState::Cautious,
            2..=3 => ThrottleState::Throttled,
            _ => ThrottleState::Backoff,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ThrottleState::Normal => "normal",
            ThrottleState::Cautious => "cautious",
            ThrottleState::Throttled => "throttled",
            ThrottleState::Backoff => "backoff",
        }
    }
}

/// Read-only snapshot of the governor.
#[derive(Debug, Clone)]
pub struct GovernorStatus {
    pub max_requests_per_second: u32,
    pub adaptive: bool,
    /// Sends recorded within the last second.
    pub requests_in_window: usize,
    pub total_requests: u64,
    pub total_throttle_hits: u64,
    pub consecutive_hits: u32,
    pub current_delay_ms: f64,
    /// Throttle hits as a percentage of all requests.
    pub hit_rate_percent: f64,
    pub state: ThrottleState,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_hit_at: Option<DateTime<Utc>>,
}

struct GovernorInner {
    settings: GovernorSettings,
    window: VecDeque<Instant>,
    current_delay_ms: f64,
    consecutive_hits: u32,
    total_requests: u64,
    total_hits: u64,
    last_request_at: Option<DateTime<Utc>>,
    last_hit_at: Option<DateTime<Utc>>,
}

impl GovernorInner {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.duration_since(oldest) >= Duration::from_secs(1) {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn status(&self) -> GovernorStatus {
        let hit_rate_percent = if self.total_requests > 0 {
            self.total_hits as f64 / self.total_requests as f64 * 100.0
        } else {
            0.0
        };
        GovernorStatus {
            max_requests_per_second: self.settings.max_requests_per_second,
            adaptive: self.settings.adaptive,
            requests_in_window: self.window.len(),
            total_requests: self.total_requests,
            total_throttle_hits: self.total_hits,
            consecutive_hits: self.consecutive_hits,
            current_delay_ms: self.current_delay_ms,
            hit_rate_percent,
            state: ThrottleState::from_consecutive_hits(self.consecutive_hits),
            last_request_at: self.last_request_at,
            last_hit_at: self.last_hit_at,
        }
    }
}

/// Shared request-rate governor.
///
/// Cheap to clone; all clones share one state. Construct once per process
/// and hand a clone to every component that talks to the CRM.
#[derive(Clone)]
pub struct RateGovernor {
    inner: Arc<Mutex<GovernorInner>>,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(GovernorSettings::default())
    }
}

impl RateGovernor {
    #[must_use]
    pub fn new(settings: GovernorSettings) -> Self {
        let settings = settings.clamped();
        let base = settings.base_delay_ms();
        Self {
            inner: Arc::new(Mutex::new(GovernorInner {
                settings,
                window: VecDeque::new(),
                current_delay_ms: base,
                consecutive_hits: 0,
                total_requests: 0,
                total_hits: 0,
                last_request_at: None,
                last_hit_at: None,
            })),
        }
    }

    /// Block until a request may be sent, then record the send timestamp.
    ///
    /// Runs entirely under the governor lock so concurrent callers serialize
    /// through the gate: wait out a full window, serve the adaptive delay,
    /// then enforce the minimum gap since the previous send.
    pub async fn acquire(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.prune(now);

        let ceiling = inner.settings.max_requests_per_second as usize;
        if inner.window.len() >= ceiling {
            if let Some(&oldest) = inner.window.front() {
                let wait = (oldest + Duration::from_secs(1)).saturating_duration_since(now);
                if !wait.is_zero() {
                    tracing::debug!(
                        wait_ms = wait.as_millis() as u64,
                        in_window = inner.window.len(),
                        "request window full, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
            inner.prune(Instant::now());
        }

        let base = inner.settings.base_delay_ms();
        if inner.settings.adaptive && inner.current_delay_ms > base {
            let extra = Duration::from_millis((inner.current_delay_ms - base) as u64);
            if !extra.is_zero() {
                tracing::debug!(
                    extra_ms = extra.as_millis() as u64,
                    "adaptive delay in effect"
                );
                tokio::time::sleep(extra).await;
            }
        }

        if let Some(&last) = inner.window.back() {
            let min_gap = Duration::from_millis(base as u64);
            let since_last = Instant::now().duration_since(last);
            if since_last < min_gap {
                tokio::time::sleep(min_gap - since_last).await;
            }
        }

        inner.window.push_back(Instant::now());
        inner.last_request_at = Some(Utc::now());
    }

    /// Record a successful response: decay the adaptive delay toward the
    /// base and clear the consecutive-hit streak.
    pub async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.total_requests += 1;
        inner.consecutive_hits = 0;
        let base = inner.settings.base_delay_ms();
        inner.current_delay_ms = (inner.current_delay_ms * RECOVERY_MULTIPLIER).max(base);
    }

    /// Record a throttle signal (429 or a throttling 403): grow the adaptive
    /// delay geometrically up to the cap.
    pub async fn on_throttle_signal(&self) {
        let mut inner = self.inner.lock().await;
        inner.total_requests += 1;
        inner.total_hits += 1;
        inner.consecutive_hits += 1;
        inner.last_hit_at = Some(Utc::now());
        inner.current_delay_ms =
            (inner.current_delay_ms * BACKOFF_MULTIPLIER).min(MAX_ADAPTIVE_DELAY_MS);
        tracing::warn!(
            consecutive = inner.consecutive_hits,
            delay_ms = inner.current_delay_ms,
            "throttle signal from CRM API"
        );
    }

    /// Current adaptive delay, used as the fallback wait when the remote
    /// sends no `Retry-After` hint.
    pub async fn current_delay(&self) -> Duration {
        let inner = self.inner.lock().await;
        Duration::from_millis(inner.current_delay_ms as u64)
    }

    /// Replace the settings; the adaptive delay resets to the new base.
    pub async fn update_settings(&self, settings: GovernorSettings) {
        let settings = settings.clamped();
        let mut inner = self.inner.lock().await;
        inner.current_delay_ms = settings.base_delay_ms();
        inner.settings = settings;
    }

    pub async fn settings(&self) -> GovernorSettings {
        self.inner.lock().await.settings.clone()
    }

    pub async fn status(&self) -> GovernorStatus {
        let mut inner = self.inner.lock().await;
        inner.prune(Instant::now());
        inner.status()
    }

    /// Zero the counters without touching the settings or the window.
    pub async fn reset_stats(&self) {
        let mut inner = self.inner.lock().await;
        inner.total_requests = 0;
        inner.total_hits = 0;
        inner.consecutive_hits = 0;
        let base = inner.settings.base_delay_ms();
        inner.current_delay_ms = base;
        inner.last_hit_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_clamp_to_the_service_ceiling() {
        let governor_settings = GovernorSettings {
            max_requests_per_second: 50,
            adaptive: true,
        }
        .clamped();
        assert_eq!(governor_settings.max_requests_per_second, 7);

        let governor_settings = GovernorSettings {
            max_requests_per_second: 0,
            adaptive: true,
        }
        .clamped();
        assert_eq!(governor_settings.max_requests_per_second, 1);
    }

    #[test]
    fn throttle_state_tracks_consecutive_hits() {
        assert_eq!(ThrottleState::from_consecutive_hits(0), ThrottleState::Normal);
        assert_eq!(ThrottleState::from_consecutive_hits(1), ThrottleState::Cautious);
        assert_eq!(ThrottleState::from_consecutive_hits(2), ThrottleState::Throttled);
        assert_eq!(ThrottleState::from_consecutive_hits(3), ThrottleState::Throttled);
        assert_eq!(ThrottleState::from_consecutive_hits(4), ThrottleState::Backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_spreads_a_burst_over_the_window() {
        let governor = RateGovernor::new(GovernorSettings {
            max_requests_per_second: 7,
            adaptive: false,
        });

        let start = Instant::now();
        for _ in 0..8 {
            governor.acquire().await;
        }
        // The eighth send cannot land inside the same one-second window as
        // the first seven.
        assert!(start.elapsed() >= Duration::from_secs(1));

        let status = governor.status().await;
        assert!(status.requests_in_window <= 7);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_enforces_the_minimum_gap() {
        let governor = RateGovernor::new(GovernorSettings {
            max_requests_per_second: 2,
            adaptive: false,
        });

        let start = Instant::now();
        governor.acquire().await;
        governor.acquire().await;
        // Base delay for 2 rps is 500 ms between sends.
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn throttle_signals_grow_the_delay_up_to_the_cap() {
        let governor = RateGovernor::default();
        let base = 1_000.0 / 7.0;

        let mut expected = base;
        for _ in 0..3 {
            governor.on_throttle_signal().await;
            expected = (expected * BACKOFF_MULTIPLIER).min(MAX_ADAPTIVE_DELAY_MS);
            let status = governor.status().await;
            assert!((status.current_delay_ms - expected).abs() < 1e-6);
        }

        // Growth is capped.
        for _ in 0..20 {
            governor.on_throttle_signal().await;
        }
        let status = governor.status().await;
        assert!((status.current_delay_ms - MAX_ADAPTIVE_DELAY_MS).abs() < 1e-6);
        assert_eq!(status.state, ThrottleState::Backoff);
    }

    #[tokio::test]
    async fn success_decays_the_delay_back_to_the_base() {
        let governor = RateGovernor::default();
        let base = 1_000.0 / 7.0;

        for _ in 0..5 {
            governor.on_throttle_signal().await;
        }
        let inflated = governor.status().await.current_delay_ms;
        assert!(inflated > base);

        governor.on_success().await;
        let status = governor.status().await;
        assert!((status.current_delay_ms - (inflated * RECOVERY_MULTIPLIER).max(base)).abs() < 1e-6);
        assert_eq!(status.consecutive_hits, 0);
        assert_eq!(status.state, ThrottleState::Normal);

        // The delay never decays below the evenly-spread base.
        for _ in 0..100 {
            governor.on_success().await;
        }
        let status = governor.status().await;
        assert!((status.current_delay_ms - base).abs() < 1e-6);
    }

    #[tokio::test]
    async fn status_reports_totals_and_hit_rate() {
        let governor = RateGovernor::default();
        governor.on_success().await;
        governor.on_success().await;
        governor.on_success().await;
        governor.on_throttle_signal().await;

        let status = governor.status().await;
        assert_eq!(status.total_requests, 4);
        assert_eq!(status.total_throttle_hits, 1);
        assert!((status.hit_rate_percent - 25.0).abs() < 1e-6);
        assert_eq!(status.state, ThrottleState::Cautious);
        assert!(status.last_hit_at.is_some());
    }

    #[tokio::test]
    async fn update_settings_resets_the_adaptive_delay() {
        let governor = RateGovernor::default();
        for _ in 0..10 {
            governor.on_throttle_signal().await;
        }
        governor
            .update_settings(GovernorSettings {
                max_requests_per_second: 4,
                adaptive: true,
            })
            .await;

        let status = governor.status().await;
        assert_eq!(status.max_requests_per_second, 4);
        assert!((status.current_delay_ms - 250.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn reset_stats_zeroes_counters() {
        let governor = RateGovernor::default();
        governor.on_throttle_signal().await;
        governor.on_success().await;
        governor.reset_stats().await;

        let status = governor.status().await;
        assert_eq!(status.total_requests, 0);
        assert_eq!(status.total_throttle_hits, 0);
        assert_eq!(status.consecutive_hits, 0);
        assert!(status.last_hit_at.is_none());
    }
}
