//! CRM API client: authenticated fetches and the paginated record stream.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::record::{IdKind, RawRecord, RecordId};
use crate::settings::{CredentialsProvider, CrmOptions};
use crate::sync::SyncError;
use crate::throttle::RateGovernor;
use crate::transport::{looks_throttled, ResilientTransport};

const ERROR_BODY_SNIPPET: usize = 256;

/// Authenticated client for the CRM's JSON API.
#[derive(Clone)]
pub struct CrmClient {
    transport: ResilientTransport,
    credentials: Arc<dyn CredentialsProvider>,
    options: CrmOptions,
}

impl CrmClient {
    pub fn new(
        transport: ResilientTransport,
        credentials: Arc<dyn CredentialsProvider>,
        options: CrmOptions,
    ) -> Self {
        Self {
            transport,
            credentials,
            options,
        }
    }

    #[must_use]
    pub fn governor(&self) -> &RateGovernor {
        self.transport.governor()
    }

    #[must_use]
    pub fn options(&self) -> &CrmOptions {
        &self.options
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), endpoint)
    }

    async fn request(&self, url: String) -> HttpRequest {
        let token = self.credentials.bearer_token().await;
        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {token}")),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Vec::new(),
        }
    }

    /// Single-shot fetch of a catalog listing, yielding each
    /// `_embedded.<collection>` item as its verbatim source text. Used by the
    /// small catalog endpoints that are not worth paginating.
    pub async fn catalog_items(
        &self,
        endpoint: &str,
        collection: &str,
    ) -> Result<Vec<String>, SyncError> {
        let request = self.request(self.url(endpoint)).await;
        let response = self.transport.send(request).await?;
        check_api_response(&response)?;
        if response.status == 204 {
            return Ok(Vec::new());
        }
        let items = embedded_items(&response.body, collection).map_err(|e| SyncError::Api {
            status: response.status,
            message: format!("invalid JSON body: {e}"),
        })?;
        Ok(items
            .unwrap_or_default()
            .iter()
            .map(|item| item.get().to_string())
            .collect())
    }

    /// Open a paginated stream over `endpoint`, yielding the items of
    /// `_embedded.<collection>` page by page.
    #[must_use]
    pub fn records(
        &self,
        endpoint: &str,
        collection: &str,
        id_kind: IdKind,
        cancel: CancellationToken,
    ) -> RecordStream {
        RecordStream {
            client: self.clone(),
            endpoint: endpoint.to_string(),
            collection: collection.to_string(),
            id_kind,
            cancel,
            page: 1,
            buffer: VecDeque::new(),
            done: false,
        }
    }
}

/// Map terminal HTTP statuses onto the run-level error taxonomy.
fn check_api_response(response: &HttpResponse) -> Result<(), SyncError> {
    if response.status == 429 {
        return Err(SyncError::ThrottleExhausted {
            status: response.status,
        });
    }
    if response.status == 403 {
        if looks_throttled(&response.body) {
            return Err(SyncError::ThrottleExhausted {
                status: response.status,
            });
        }
        return Err(SyncError::Authorization {
            message: body_snippet(&response.body),
        });
    }
    if !response.is_success() {
        return Err(SyncError::Api {
            status: response.status,
            message: body_snippet(&response.body),
        });
    }
    Ok(())
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut snippet: String = text.chars().take(ERROR_BODY_SNIPPET).collect();
    if text.chars().count() > ERROR_BODY_SNIPPET {
        snippet.push('…');
    }
    snippet
}

/// Page envelope keeping every `_embedded` collection as uninterpreted text,
/// so stored payloads stay byte-for-byte what the remote sent.
#[derive(Deserialize)]
struct EmbeddedBody<'a> {
    #[serde(rename = "_embedded", borrow, default)]
    embedded: Option<HashMap<String, &'a RawValue>>,
}

/// Only the field the stream reads eagerly; everything else stays verbatim.
#[derive(Deserialize)]
struct IdProbe {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// The items of `_embedded.<collection>` as verbatim slices of `body`.
/// `Ok(None)` means the collection is missing (or not an array).
fn embedded_items<'a>(
    body: &'a [u8],
    collection: &str,
) -> Result<Option<Vec<&'a RawValue>>, serde_json::Error> {
    let envelope: EmbeddedBody<'a> = serde_json::from_slice(body)?;
    let Some(node) = envelope
        .embedded
        .and_then(|mut collections| collections.remove(collection))
    else {
        return Ok(None);
    };
    Ok(serde_json::from_str::<Vec<&RawValue>>(node.get()).ok())
}

/// Pull-based iterator over one paginated listing.
///
/// Not restartable: once it reports the end of data it stays finished.
/// Cancellation is cooperative and checked before every yield, so a
/// cancelled consumer still gets to flush whatever it already buffered.
pub struct RecordStream {
    client: CrmClient,
    endpoint: String,
    collection: String,
    id_kind: IdKind,
    cancel: CancellationToken,
    page: u32,
    buffer: VecDeque<RawRecord>,
    done: bool,
}

impl RecordStream {
    /// Next record, or `None` once the listing is exhausted or cancelled.
    pub async fn next(&mut self) -> Result<Option<RawRecord>, SyncError> {
        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return Ok(None);
            }
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    async fn fetch_next_page(&mut self) -> Result<(), SyncError> {
        // Courtesy delay between pages; independent of the governor's pacing.
        if self.page > 1 && self.client.options.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.client.options.request_delay_ms)).await;
        }

        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = self.client.url(&format!(
            "{}{}limit={}&page={}",
            self.endpoint, separator, self.client.options.page_size, self.page
        ));
        tracing::debug!(%url, page = self.page, "fetching page");

        let request = self.client.request(url).await;
        let response = self.client.transport.send(request).await?;

        // 204 is the remote's explicit end-of-data marker.
        if response.status == 204 {
            self.done = true;
            return Ok(());
        }
        check_api_response(&response)?;

        let items = embedded_items(&response.body, &self.collection).map_err(|e| {
            SyncError::Api {
                status: response.status,
                message: format!("invalid JSON body: {e}"),
            }
        })?;
        let Some(items) = items else {
            self.done = true;
            return Ok(());
        };
        if items.is_empty() {
            self.done = true;
            return Ok(());
        }

        for item in items {
            let id = serde_json::from_str::<IdProbe>(item.get())
                .ok()
                .and_then(|probe| probe.id)
                .and_then(|value| RecordId::from_json(&value, self.id_kind));
            let Some(id) = id else {
                tracing::debug!(page = self.page, "record without usable id, skipping");
                continue;
            };
            self.buffer.push_back(RawRecord {
                id,
                raw: item.get().to_string(),
                page: self.page,
            });
        }
        self.page += 1;
        Ok(())
    }
}
