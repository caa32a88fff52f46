// # Cloudflare API v4 client
//
// Thin wrapper over reqwest. Every response is the `{success, errors,
// result, result_info}` envelope; list endpoints are paginated with
// `page`/`per_page` and report `total_pages` in `result_info`.
//
// ## Endpoints
//
// - List zones: GET `/zones`
// - Create zone: POST `/zones`
// - List DNS records: GET `/zones/:zone_id/dns_records`
// - Create DNS record: POST `/zones/:zone_id/dns_records`
// - Update DNS record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - Redirect rules: GET/PUT `/zones/:zone_id/rulesets/phases/http_request_dynamic_redirect/entrypoint`
//
// ## Security
//
// The API token never appears in logs or `Debug` output.

use dnsctl_core::error::Error;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::PROVIDER_TYPE;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PER_PAGE: u32 = 100;

const REDIRECT_ENTRYPOINT: &str = "rulesets/phases/http_request_dynamic_redirect/entrypoint";

/// Failures talking to the API, before they are mapped onto engine errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request never produced a response
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("{what}: {status} - {body}")]
    Status {
        /// Request description
        what: String,
        /// HTTP status
        status: StatusCode,
        /// Response body, for diagnostics
        body: String,
    },

    /// 2xx response with `success: false`
    #[error("{what}: {messages}")]
    Rejected {
        /// Request description
        what: String,
        /// Joined API error messages
        messages: String,
    },
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => Error::http(format!("Cloudflare request failed: {e}")),
            ApiError::Status { what, status, body } => match status.as_u16() {
                401 | 403 => Error::provider(
                    PROVIDER_TYPE,
                    format!("Authentication failed: invalid API token or insufficient permissions. Status: {status}"),
                ),
                404 => Error::not_found(format!("{what}: {status}")),
                409 => Error::provider(PROVIDER_TYPE, format!("Conflict during {what}: {body}")),
                429 => Error::provider(
                    PROVIDER_TYPE,
                    format!("Rate limit exceeded. Please retry later. Status: {status}"),
                ),
                500..=599 => Error::provider(
                    PROVIDER_TYPE,
                    format!("Cloudflare server error (transient): {status} - {body}"),
                ),
                _ => Error::provider(PROVIDER_TYPE, format!("{what} failed: {status} - {body}")),
            },
            rejected @ ApiError::Rejected { .. } => Error::provider(PROVIDER_TYPE, rejected.to_string()),
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: Option<u32>,
}

/// A zone as listed by the API
#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    /// Zone ID
    pub id: String,
    /// Zone apex
    pub name: String,
    /// Nameservers Cloudflare assigned to the zone
    #[serde(default)]
    pub name_servers: Vec<String>,
}

/// A DNS record in Cloudflare's wire shape
///
/// Simple types carry `content`; structured types (SRV, CAA, TLSA, DS,
/// SVCB, HTTPS) carry `data` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Record ID; empty for records not created yet
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: String,
    /// Owner name, fully qualified, no trailing dot
    pub name: String,
    /// Text content of simple types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// TTL in seconds; 1 means automatic
    pub ttl: u32,
    /// MX preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    /// Whether traffic goes through Cloudflare's proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    /// Fields of structured types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One rule of the zone's dynamic redirect ruleset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Rule ID, assigned by Cloudflare
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Free-form rule name
    #[serde(default)]
    pub description: String,
    /// Filter expression selecting the requests to redirect
    pub expression: String,
    /// Always `redirect` in this phase
    pub action: String,
    /// Where and how to redirect
    pub action_parameters: RedirectParameters,
    /// Whether the rule is active
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

/// Action parameters of a redirect rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectParameters {
    /// Target computed from the request
    pub from_value: RedirectTarget,
}

/// Status code and target of a redirect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectTarget {
    /// HTTP status code (301, 302, 303, 307 or 308)
    pub status_code: u16,
    /// Target URL, static or as an expression
    pub target_url: TargetUrl,
    /// Keep the query string of the original request
    #[serde(default)]
    pub preserve_query_string: bool,
}

/// Static or dynamic redirect target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetUrl {
    /// Dynamic target expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Static target URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Ruleset {
    #[serde(default)]
    rules: Vec<RedirectRule>,
}

/// Authenticated API client
#[derive(Clone)]
pub struct CloudflareApi {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account new zones are created in
    account_id: Option<String>,

    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareApi")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareApi {
    /// Create a client for `base_url`
    ///
    /// Fails if the token is empty or the HTTP client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        account_id: Option<String>,
        base_url: impl Into<String>,
    ) -> dnsctl_core::Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_token,
            account_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ApiResult<(Option<T>, Option<ResultInfo>)> {
        let what = format!("{method} {path}");
        tracing::debug!("Cloudflare {}", what);

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ApiError::Status { what, status, body });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            let messages = envelope
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ApiError::Rejected { what, messages });
        }
        Ok((envelope.result, envelope.result_info))
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let query = [("page", page.to_string()), ("per_page", PER_PAGE.to_string())];
            let (result, info) = self.request::<Vec<T>>(Method::GET, path, &query, None).await?;
            all.extend(result.unwrap_or_default());
            match info.and_then(|i| i.total_pages) {
                Some(total) if page < total => page += 1,
                _ => break,
            }
        }
        Ok(all)
    }

    /// Every zone visible to the token
    pub async fn list_zones(&self) -> dnsctl_core::Result<Vec<Zone>> {
        Ok(self.get_all("/zones").await?)
    }

    /// Create a zone in the configured account
    pub async fn create_zone(&self, name: &str) -> dnsctl_core::Result<Zone> {
        let account = self.account_id.as_deref().ok_or_else(|| {
            Error::config(format!("creating zone {name} needs the accountid credential"))
        })?;
        let body = json!({"name": name, "account": {"id": account}, "jump_start": false});
        let (zone, _) = self.request::<Zone>(Method::POST, "/zones", &[], Some(&body)).await?;
        zone.ok_or_else(|| Error::provider(PROVIDER_TYPE, format!("zone {name} created without a result")))
    }

    /// Every DNS record of a zone
    pub async fn list_records(&self, zone_id: &str) -> dnsctl_core::Result<Vec<DnsRecord>> {
        Ok(self.get_all(&format!("/zones/{zone_id}/dns_records")).await?)
    }

    /// Create a DNS record
    pub async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> dnsctl_core::Result<()> {
        let body = serde_json::to_value(record)?;
        self.request::<Value>(Method::POST, &format!("/zones/{zone_id}/dns_records"), &[], Some(&body))
            .await?;
        Ok(())
    }

    /// Overwrite a DNS record
    pub async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> dnsctl_core::Result<()> {
        let body = serde_json::to_value(record)?;
        let path = format!("/zones/{zone_id}/dns_records/{record_id}");
        self.request::<Value>(Method::PUT, &path, &[], Some(&body)).await?;
        Ok(())
    }

    /// Delete a DNS record
    pub async fn delete_record(&self, zone_id: &str, record_id: &str) -> dnsctl_core::Result<()> {
        let path = format!("/zones/{zone_id}/dns_records/{record_id}");
        self.request::<Value>(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    /// Rules of the zone's redirect ruleset; a zone without one has none.
    pub async fn get_redirect_rules(&self, zone_id: &str) -> dnsctl_core::Result<Vec<RedirectRule>> {
        let path = format!("/zones/{zone_id}/{REDIRECT_ENTRYPOINT}");
        match self.request::<Ruleset>(Method::GET, &path, &[], None).await {
            Ok((ruleset, _)) => Ok(ruleset.unwrap_or_default().rules),
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the zone's redirect rules
    pub async fn put_redirect_rules(&self, zone_id: &str, rules: &[RedirectRule]) -> dnsctl_core::Result<()> {
        let path = format!("/zones/{zone_id}/{REDIRECT_ENTRYPOINT}");
        let body = json!({ "rules": rules });
        self.request::<Value>(Method::PUT, &path, &[], Some(&body)).await?;
        Ok(())
    }
}
