//! Governed, retrying send path for CRM API calls.
//!
//! Every request flows through [`ResilientTransport::send`]: acquire a slot
//! from the [`RateGovernor`], send, then classify the outcome. Throttle
//! responses (429, or 403s whose body talks about rate limits) are retried a
//! bounded number of times with the remote's `Retry-After` hint when present;
//! transport-level failures get a short linear backoff. When retries run out
//! on a throttle response the last response is returned as-is so the caller
//! sees the real status instead of a synthetic error. A cancellation token
//! cuts backoff waits short, returning the last outcome immediately.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::throttle::RateGovernor;

/// Extra attempts after the first send.
pub const MAX_RETRIES: u32 = 3;

/// Transport-level failure that survived every retry.
#[derive(Debug, Error)]
#[error("transport failure after {attempts} attempts: {source}")]
pub struct TransportError {
    pub attempts: u32,
    #[source]
    pub source: HttpError,
}

/// Rate-governed transport with the retry protocol baked in.
#[derive(Clone)]
pub struct ResilientTransport {
    inner: Arc<dyn HttpTransport>,
    governor: RateGovernor,
    cancel: CancellationToken,
}

impl ResilientTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, governor: RateGovernor) -> Self {
        Self::with_cancellation(inner, governor, CancellationToken::new())
    }

    /// Like [`ResilientTransport::new`], but backoff waits abort as soon as
    /// `cancel` fires instead of sleeping them out.
    pub fn with_cancellation(
        inner: Arc<dyn HttpTransport>,
        governor: RateGovernor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            governor,
            cancel,
        }
    }

    #[must_use]
    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Wait out a backoff delay. Returns false if cancellation cut it short,
    /// in which case the caller gives up retrying.
    async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Send a request, waiting on the governor before every attempt.
    ///
    /// Non-throttle HTTP statuses (including plain 403s and 5xx) are returned
    /// to the caller untouched; status interpretation belongs one layer up.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut attempt: u32 = 0;
        loop {
            self.governor.acquire().await;

            match self.inner.send(request.clone()).await {
                Ok(response) if response.status == 429 => {
                    self.governor.on_throttle_signal().await;
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        tracing::warn!(url = %request.url, "still throttled after all retries");
                        return Ok(response);
                    }
                    let wait = retry_after(&response)
                        .unwrap_or(self.governor.current_delay().await);
                    tracing::warn!(
                        attempt,
                        max_retries = MAX_RETRIES,
                        wait_ms = wait.as_millis() as u64,
                        url = %request.url,
                        "throttled by CRM API, backing off"
                    );
                    if !self.backoff(wait).await {
                        return Ok(response);
                    }
                }
                Ok(response) if response.status == 403 && looks_throttled(&response.body) => {
                    // Some deployments answer over-rate traffic with 403 and
                    // only the body gives it away.
                    self.governor.on_throttle_signal().await;
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        tracing::warn!(url = %request.url, "still throttled after all retries");
                        return Ok(response);
                    }
                    let wait = self.governor.current_delay().await;
                    tracing::warn!(
                        attempt,
                        max_retries = MAX_RETRIES,
                        wait_ms = wait.as_millis() as u64,
                        url = %request.url,
                        "403 with throttle body, backing off"
                    );
                    if !self.backoff(wait).await {
                        return Ok(response);
                    }
                }
                Ok(response) => {
                    if response.is_success() {
                        self.governor.on_success().await;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(TransportError {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::warn!(
                        attempt,
                        max_retries = MAX_RETRIES,
                        error = %err,
                        url = %request.url,
                        "transport error, retrying"
                    );
                    if !self.backoff(Duration::from_secs(u64::from(attempt))).await {
                        return Err(TransportError {
                            attempts: attempt,
                            source: err,
                        });
                    }
                }
            }
        }
    }
}

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Heuristic for 403 bodies that are really rate-limit rejections.
pub(crate) fn looks_throttled(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_ascii_lowercase();
    text.contains("rate") || text.contains("limit") || text.contains("throttl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport};
    use tokio::time::Instant;

    fn request(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn response(status: u16, headers: Vec<(String, String)>, body: &[u8]) -> HttpResponse {
        HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    fn transport(mock: &MockTransport) -> ResilientTransport {
        ResilientTransport::new(Arc::new(mock.clone()), RateGovernor::default())
    }

    #[tokio::test(start_paused = true)]
    async fn success_passes_through_and_records_success() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/users";
        mock.push_response(HttpMethod::Get, url, response(200, Vec::new(), b"{}"));

        let transport = transport(&mock);
        let resp = transport.send(request(url)).await.expect("send");
        assert_eq!(resp.status, 200);

        let status = transport.governor().status().await;
        assert_eq!(status.total_requests, 1);
        assert_eq!(status.total_throttle_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn honors_retry_after_on_429() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/leads";
        mock.push_response(
            HttpMethod::Get,
            url,
            response(429, vec![("Retry-After".to_string(), "2".to_string())], b""),
        );
        mock.push_response(HttpMethod::Get, url, response(200, Vec::new(), b"{}"));

        let transport = transport(&mock);
        let start = Instant::now();
        let resp = transport.send(request(url)).await.expect("send");

        assert_eq!(resp.status, 200);
        assert_eq!(mock.requests().len(), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));

        let status = transport.governor().status().await;
        assert_eq!(status.total_throttle_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_response_when_throttling_never_stops() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/leads";
        for _ in 0..4 {
            mock.push_response(HttpMethod::Get, url, response(429, Vec::new(), b"busy"));
        }

        let transport = transport(&mock);
        let resp = transport.send(request(url)).await.expect("send");

        // Initial attempt + MAX_RETRIES, then the last 429 comes back.
        assert_eq!(resp.status, 429);
        assert_eq!(mock.requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn treats_403_with_throttle_body_as_throttling() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/contacts";
        mock.push_response(
            HttpMethod::Get,
            url,
            response(403, Vec::new(), b"{\"detail\":\"Rate limit exceeded\"}"),
        );
        mock.push_response(HttpMethod::Get, url, response(200, Vec::new(), b"{}"));

        let transport = transport(&mock);
        let resp = transport.send(request(url)).await.expect("send");

        assert_eq!(resp.status, 200);
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(transport.governor().status().await.total_throttle_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn plain_403_is_not_retried() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/contacts";
        mock.push_response(
            HttpMethod::Get,
            url,
            response(403, Vec::new(), b"{\"detail\":\"invalid token\"}"),
        );

        let transport = transport(&mock);
        let resp = transport.send(request(url)).await.expect("send");

        assert_eq!(resp.status, 403);
        assert_eq!(mock.requests().len(), 1);
        assert_eq!(transport.governor().status().await.total_throttle_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_back_off_linearly_then_surface() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/tasks";
        for _ in 0..4 {
            mock.push_transport_error(HttpMethod::Get, url, "timed out");
        }

        let transport = transport(&mock);
        let start = Instant::now();
        let err = transport.send(request(url)).await.expect_err("exhausted");

        assert_eq!(err.attempts, 4);
        assert_eq!(mock.requests().len(), 4);
        // Linear backoff: 1 s + 2 s + 3 s between the four attempts.
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_recovers_on_a_later_attempt() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/tasks";
        mock.push_transport_error(HttpMethod::Get, url, "connection reset");
        mock.push_response(HttpMethod::Get, url, response(200, Vec::new(), b"{}"));

        let transport = transport(&mock);
        let resp = transport.send(request(url)).await.expect("send");
        assert_eq!(resp.status, 200);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_a_throttle_backoff_short() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/leads";
        mock.push_response(
            HttpMethod::Get,
            url,
            response(429, vec![("Retry-After".to_string(), "3600".to_string())], b""),
        );

        let cancel = CancellationToken::new();
        let transport = ResilientTransport::with_cancellation(
            Arc::new(mock.clone()),
            RateGovernor::default(),
            cancel.clone(),
        );

        let start = Instant::now();
        let task = tokio::spawn(async move { transport.send(request(url)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let resp = task.await.expect("join").expect("send");
        // The hour-long Retry-After never elapses; the last 429 comes back.
        assert_eq!(resp.status, 429);
        assert_eq!(mock.requests().len(), 1);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_transport_backoff_surfaces_the_error() {
        let mock = MockTransport::new();
        let url = "https://crm.example.com/api/v4/tasks";
        mock.push_transport_error(HttpMethod::Get, url, "timed out");

        let cancel = CancellationToken::new();
        let transport = ResilientTransport::with_cancellation(
            Arc::new(mock.clone()),
            RateGovernor::default(),
            cancel.clone(),
        );

        let task = tokio::spawn(async move { transport.send(request(url)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = task.await.expect("join").expect_err("cancelled mid-backoff");
        assert_eq!(err.attempts, 1);
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn throttle_body_sniffing_is_case_insensitive() {
        assert!(looks_throttled(b"Rate limit exceeded"));
        assert!(looks_throttled(b"THROTTLED"));
        assert!(looks_throttled(b"account limit reached"));
        assert!(!looks_throttled(b"forbidden: insufficient scope"));
        assert!(!looks_throttled(b""));
    }
}
