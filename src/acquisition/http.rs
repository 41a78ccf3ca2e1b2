//! Retry-aware page fetching over plain HTTP.
//!
//! Not a browser — just reqwest with browser-like headers. Every fetch is
//! classified into a [`FetchOutcome`]; nothing here returns `Err`. Transport
//! failures are retried with a linearly increasing delay, terminal statuses
//! (403, 404, redirect loops) short-circuit, and whatever was observed last
//! is what the caller gets.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::config::FetchSettings;

/// Classified result of trying to reach a page. `Online` is the only state
/// that carries content; `Unknown` is the pre-fetch placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessStatus {
    Online,
    Blocked,
    NotFound,
    Timeout,
    ConnectionError,
    HttpError(u16),
    RedirectError,
    Error,
    #[default]
    Unknown,
}

impl AccessStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, AccessStatus::Online)
    }

    /// Statuses that count as an access problem for risk purposes.
    pub fn is_access_issue(&self) -> bool {
        matches!(
            self,
            AccessStatus::Blocked | AccessStatus::Timeout | AccessStatus::Error
        )
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessStatus::Online => write!(f, "online"),
            AccessStatus::Blocked => write!(f, "blocked"),
            AccessStatus::NotFound => write!(f, "not_found"),
            AccessStatus::Timeout => write!(f, "timeout"),
            AccessStatus::ConnectionError => write!(f, "connection_error"),
            AccessStatus::HttpError(code) => write!(f, "http_error_{code}"),
            AccessStatus::RedirectError => write!(f, "redirect_error"),
            AccessStatus::Error => write!(f, "error"),
            AccessStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for AccessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(AccessStatus::Online),
            "blocked" => Ok(AccessStatus::Blocked),
            "not_found" => Ok(AccessStatus::NotFound),
            "timeout" => Ok(AccessStatus::Timeout),
            "connection_error" => Ok(AccessStatus::ConnectionError),
            "redirect_error" => Ok(AccessStatus::RedirectError),
            "error" => Ok(AccessStatus::Error),
            "unknown" => Ok(AccessStatus::Unknown),
            other => match other.strip_prefix("http_error_") {
                Some(code) => code
                    .parse::<u16>()
                    .map(AccessStatus::HttpError)
                    .map_err(|_| format!("bad status code in {other:?}")),
                None => Err(format!("unrecognized access status {other:?}")),
            },
        }
    }
}

// The output document carries statuses as flat strings ("http_error_503"),
// so the enum round-trips through Display/FromStr rather than derive.
impl Serialize for AccessStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccessStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What one `fetch` produced, success or not.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// URL as requested.
    pub url: String,
    /// URL after redirects; equals `url` until a response was seen.
    pub final_url: String,
    pub status: AccessStatus,
    /// Attempts made, including the final one.
    pub attempts: u32,
    /// Page body, present iff `status` is `Online`.
    pub content: Option<String>,
    /// Captured error detail for failure statuses.
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn pending(url: &str) -> Self {
        Self {
            url: url.to_string(),
            final_url: url.to_string(),
            status: AccessStatus::Unknown,
            attempts: 0,
            content: None,
            error: None,
        }
    }

    /// Outcome for a work unit that failed outside the fetch path.
    pub fn failed(url: &str, message: impl Into<String>) -> Self {
        Self {
            status: AccessStatus::Error,
            error: Some(message.into()),
            ..Self::pending(url)
        }
    }
}

/// One fetch session, owned by a single work unit and reused for every page
/// of that target (connection pooling, consistent identity).
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        Self {
            client,
            settings: settings.clone(),
        }
    }

    /// Fetch one URL under the retry policy. Never returns an error; the
    /// outcome's status says what happened.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::pending(url);
        let max_attempts = self.settings.retry_attempts.max(1);

        for attempt in 1..=max_attempts {
            outcome.attempts = attempt;

            // Pacing before the first try, linear backoff before retries.
            let delay = if attempt > 1 {
                self.settings.retry_delay() * attempt
            } else {
                self.settings.rate_limit_delay()
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(resp) => {
                    let code = resp.status().as_u16();
                    outcome.final_url = resp.url().to_string();

                    match code {
                        200 => {
                            match resp.text().await {
                                Ok(body) => {
                                    debug!(url, attempt, "fetched");
                                    outcome.status = AccessStatus::Online;
                                    outcome.content = Some(body);
                                }
                                Err(e) => {
                                    outcome.status = AccessStatus::Error;
                                    outcome.error = Some(format!("body read failed: {e}"));
                                }
                            }
                            return outcome;
                        }
                        403 => {
                            warn!(url, "access forbidden (403)");
                            outcome.status = AccessStatus::Blocked;
                            return outcome;
                        }
                        404 => {
                            warn!(url, "page not found (404)");
                            outcome.status = AccessStatus::NotFound;
                            return outcome;
                        }
                        other => {
                            warn!(url, code = other, attempt, "http error");
                            outcome.status = AccessStatus::HttpError(other);
                        }
                    }
                }
                Err(e) => {
                    if e.is_redirect() {
                        warn!(url, "redirect loop");
                        outcome.status = AccessStatus::RedirectError;
                        outcome.error = Some(e.to_string());
                        return outcome;
                    }
                    if e.is_timeout() {
                        warn!(url, attempt, max_attempts, "timeout");
                        outcome.status = AccessStatus::Timeout;
                    } else if e.is_connect() {
                        warn!(url, attempt, max_attempts, "connection error");
                        outcome.status = AccessStatus::ConnectionError;
                    } else {
                        warn!(url, attempt, error = %e, "unexpected fetch error");
                        outcome.status = AccessStatus::Error;
                    }
                    outcome.error = Some(e.to_string());
                }
            }
        }

        // Retries exhausted; the last classification stands.
        outcome
    }

    /// Join a subpath onto a base URL the way the subpage channels expect:
    /// base with any trailing slash removed, path with its leading slash.
    pub fn join_path(base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }
}
