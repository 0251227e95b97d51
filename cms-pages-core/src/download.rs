//! Content Delivery API client.
//!
//! [`DeliveryClient`] issues a single `GET /spaces/{space}/entries` request per
//! call and resolves linked entries (one level deep) from the response's
//! `includes`, so templates can read e.g. `category.fields.title` directly.
//! [`DeliveryClientFactory`] hands out one client per (space, token) pair and
//! shares a single connection pool between them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::PluginOptions;
use crate::contract::{ClientFactory, CmsClient, CmsEntry};
use crate::error::FetchFailure;
use crate::query::Query;

/// A Delivery API client bound to one space.
pub struct DeliveryClient {
    http: reqwest::Client,
    host: String,
    space_id: String,
    access_token: String,
}

impl DeliveryClient {
    pub fn new(
        http: reqwest::Client,
        host: impl Into<String>,
        space_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            host: host.into(),
            space_id: space_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn entries_url(&self) -> String {
        format!(
            "{}/spaces/{}/entries",
            self.host.trim_end_matches('/'),
            self.space_id
        )
    }
}

#[async_trait]
impl CmsClient for DeliveryClient {
    async fn entries(&self, query: Query) -> Result<Vec<CmsEntry>, FetchFailure> {
        let url = self.entries_url();
        let params = query.to_params();
        info!(url = %url, space_id = %self.space_id, ?params, "[CMS][FETCH] Fetching entries");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, url = %url, "[CMS][FETCH] Failed to reach content API");
                FetchFailure::from(e)
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!(error = ?e, url = %url, "[CMS][FETCH] Failed to read response body");
            FetchFailure::from(e)
        })?;

        if !status.is_success() {
            let message = api_error_message(status, &text);
            error!(status = %status, url = %url, message = %message, "[CMS][FETCH] Content API returned error");
            return Err(FetchFailure::new(message));
        }

        let entries = parse_entries_response(&text)?;
        info!(url = %url, count = entries.len(), "[CMS][FETCH] Fetched entries");
        Ok(entries)
    }
}

/// Error message from an API error body (`{"message": ...}`), or the status line.
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .map(|message| format!("{status}: {message}"))
        .unwrap_or_else(|| format!("content API returned {status}"))
}

#[derive(Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Default, Deserialize)]
struct Includes {
    #[serde(default, rename = "Entry")]
    entry: Vec<Value>,
}

/// Decode an entries response body, resolving entry links in item fields.
///
/// Items that do not decode as entries are skipped; their siblings are kept.
pub fn parse_entries_response(body: &str) -> Result<Vec<CmsEntry>, FetchFailure> {
    let response: EntriesResponse = serde_json::from_str(body)
        .map_err(|e| FetchFailure::new(format!("invalid entries response: {e}")))?;

    let mut linked: HashMap<String, Value> = HashMap::new();
    for candidate in response.includes.entry.iter().chain(response.items.iter()) {
        if let Some(id) = candidate.pointer("/sys/id").and_then(Value::as_str) {
            linked.entry(id.to_string()).or_insert_with(|| candidate.clone());
        }
    }

    Ok(response
        .items
        .into_iter()
        .filter_map(|mut item| {
            if let Some(Value::Object(fields)) = item.get_mut("fields") {
                for value in fields.values_mut() {
                    resolve_links(value, &linked);
                }
            }
            let id = item.pointer("/sys/id").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value::<CmsEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(entry_id = ?id, error = %e, "[CMS][FETCH] Skipping undecodable entry");
                    None
                }
            }
        })
        .collect())
}

fn resolve_links(value: &mut Value, linked: &HashMap<String, Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                resolve_links(item, linked);
            }
        }
        Value::Object(_) => {
            if let Some(target) = entry_link_id(value).and_then(|id| linked.get(id)) {
                *value = target.clone();
            }
        }
        _ => {}
    }
}

fn entry_link_id(value: &Value) -> Option<&str> {
    let sys = value.get("sys")?;
    if sys.get("type")?.as_str()? != "Link" || sys.get("linkType")?.as_str()? != "Entry" {
        return None;
    }
    sys.get("id")?.as_str()
}

/// Builds [`DeliveryClient`]s, caching one per (space, token) pair.
pub struct DeliveryClientFactory {
    http: reqwest::Client,
    host: String,
    clients: Mutex<HashMap<(String, String), Arc<DeliveryClient>>>,
}

impl DeliveryClientFactory {
    pub fn new(host: impl Into<String>) -> Result<Self, FetchFailure> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cms-pages/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(host, http))
    }

    pub fn from_options(options: &PluginOptions) -> Result<Self, FetchFailure> {
        Self::new(options.host())
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, test servers).
    pub fn with_http_client(host: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            host: host.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

impl ClientFactory for DeliveryClientFactory {
    fn connect(
        &self,
        space_id: &str,
        access_token: &str,
    ) -> Result<Arc<dyn CmsClient>, FetchFailure> {
        let mut clients = self.clients.lock();
        let client = clients
            .entry((space_id.to_string(), access_token.to_string()))
            .or_insert_with(|| {
                debug!(space_id, host = %self.host, "[CMS] Creating delivery client");
                Arc::new(DeliveryClient::new(
                    self.http.clone(),
                    self.host.clone(),
                    space_id,
                    access_token,
                ))
            })
            .clone();
        let client: Arc<dyn CmsClient> = client;
        Ok(client)
    }
}
