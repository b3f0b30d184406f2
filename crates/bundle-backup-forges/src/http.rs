use std::time::Duration;

use bundle_backup::ProviderError;
use chrono::Utc;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 1000;

const USER_AGENT: &str = concat!("bundle-backup/", env!("CARGO_PKG_VERSION"));

/// Timeout and retry policy for API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Per-request timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_attempts: 3,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl HttpOptions {
    /// `min_backoff * 2^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.min_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// JSON-over-HTTP client shared by the forge providers.
///
/// Network errors, `5xx` and rate-limited responses (`429`, or `403` with
/// an exhausted quota) are retried; other `401` and `403` responses fail
/// immediately as [`ProviderError::Auth`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    options: HttpOptions,
}

impl ApiClient {
    /// `headers` are sent with every request, typically the auth header.
    pub fn new(options: HttpOptions, mut headers: HeaderMap) -> Result<Self, ProviderError> {
        for value in headers.values_mut() {
            value.set_sensitive(true);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// GET `url` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ProviderError> {
        let response = self.send(url).await?;
        decode(response, url).await
    }

    /// GET `url`, retrying until a success status or a non-retryable
    /// failure.
    async fn send(&self, url: &Url) -> Result<Response, ProviderError> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (reason, delay) = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    let headers = response.headers();
                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
                        || (status == StatusCode::FORBIDDEN && is_rate_limited(headers));

                    if rate_limited {
                        let delay = retry_after(headers)
                            .or_else(|| rate_limit_reset(headers))
                            .map(|d| d.min(self.options.max_backoff))
                            .unwrap_or_else(|| self.options.backoff(attempt));
                        (format!("HTTP {status} (rate limited)"), delay)
                    } else if status == StatusCode::UNAUTHORIZED
                        || status == StatusCode::FORBIDDEN
                    {
                        return Err(ProviderError::Auth(format!("HTTP {status} from {url}")));
                    } else if status.is_server_error() {
                        (format!("HTTP {status}"), self.options.backoff(attempt))
                    } else {
                        return Err(ProviderError::Network(format!("HTTP {status} from {url}")));
                    }
                }
                Err(e) => (e.to_string(), self.options.backoff(attempt)),
            };

            if attempt >= max_attempts {
                return Err(ProviderError::Network(format!(
                    "{url}: {reason} (gave up after {attempt} attempts)"
                )));
            }

            warn!(%url, %reason, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch every page of a list endpoint.
    ///
    /// `size_param` names the page-size query parameter (`per_page` or
    /// `limit`). When the server sends a `Link` header, paging continues
    /// while it has a `rel="next"` entry, whatever the page size the
    /// server actually applied. Without one, a page shorter than
    /// `per_page` is the last. An empty page always ends the listing.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        url: &Url,
        size_param: &str,
        per_page: usize,
    ) -> Result<Vec<T>, ProviderError> {
        let per_page = per_page.max(1);
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair(size_param, &per_page.to_string())
                .append_pair("page", &page.to_string());

            let response = self.send(&page_url).await?;
            let has_next = has_next_link(response.headers());
            let batch: Vec<T> = decode(response, &page_url).await?;
            let count = batch.len();
            items.extend(batch);
            debug!(%url, page, count, ?has_next, "fetched page");

            let last = match has_next {
                Some(has_next) => !has_next,
                None => count < per_page,
            };
            if count == 0 || last {
                return Ok(items);
            }
        }

        warn!(%url, pages = MAX_PAGES, "stopped paging at page limit");
        Ok(items)
    }
}

async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::Parse(format!("{url}: {e}")))
}

/// `<api base>/<path>`, tolerating a trailing slash on the base.
pub fn endpoint(api_base: &str, path: &str) -> Result<Url, ProviderError> {
    let raw = format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|e| ProviderError::Config(format!("invalid API URL {raw}: {e}")))
}

/// Percent-encode one path segment, including any `/`.
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn header_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .find_map(|name| headers.get(*name))?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_u64(headers, &[RETRY_AFTER.as_str()]).map(Duration::from_secs)
}

/// A `403` is a rate limit, not an auth failure, when the quota is spent
/// or the server asks for a retry.
fn is_rate_limited(headers: &HeaderMap) -> bool {
    header_u64(headers, &["x-ratelimit-remaining", "ratelimit-remaining"]) == Some(0)
        || headers.contains_key(RETRY_AFTER)
}

/// Time until the epoch-seconds reset in `X-RateLimit-Reset`.
fn rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    let reset = header_u64(headers, &["x-ratelimit-reset", "ratelimit-reset"])?;
    let now = u64::try_from(Utc::now().timestamp()).ok()?;
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

/// `Some(true)` if a `Link` header has a `rel="next"` entry, `Some(false)`
/// if it has none, `None` without a `Link` header.
fn has_next_link(headers: &HeaderMap) -> Option<bool> {
    let value = headers.get(LINK)?.to_str().ok()?;
    Some(value.split(',').any(|link| {
        link.split(';')
            .skip(1)
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"")
    }))
}
