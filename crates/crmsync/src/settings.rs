//! Runtime configuration for the CRM client and sync jobs.

use async_trait::async_trait;

/// Remote API connection options.
#[derive(Debug, Clone)]
pub struct CrmOptions {
    /// API root, e.g. `https://example.amocrm.com/api/v4`.
    pub base_url: String,
    /// Page size for streamed endpoints; the remote caps this at 250.
    pub page_size: u32,
    /// Courtesy delay between successive pages, on top of the governor.
    pub request_delay_ms: u64,
}

impl Default for CrmOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: 250,
            request_delay_ms: 200,
        }
    }
}

/// Per-run sync tuning.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// How far back a first event sync reaches; zero means the default (6).
    pub events_lookback_months: u32,
    /// How far back a first message sync reaches; zero means the default (12).
    pub messages_lookback_months: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            events_lookback_months: 6,
            messages_lookback_months: 12,
        }
    }
}

/// Boundary for obtaining the current bearer token.
///
/// Token storage and refresh live outside this crate; sync code only ever
/// asks for "the token to use right now".
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn bearer_token(&self) -> String;
}

/// Fixed token supplied by configuration.
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialsProvider for StaticToken {
    async fn bearer_token(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_hands_back_its_value() {
        let provider = StaticToken("tok-123".to_string());
        assert_eq!(provider.bearer_token().await, "tok-123");
    }

    #[test]
    fn defaults_match_the_remote_limits() {
        let options = CrmOptions::default();
        assert_eq!(options.page_size, 250);
        assert_eq!(options.request_delay_ms, 200);
    }
}
