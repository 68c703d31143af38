//! The HTTP download engine: streaming GETs with manual redirect handling,
//! credential scoping, conditional revalidation, and retry budgets.

use std::error::Error as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode, Url};
use tokio::io::AsyncWriteExt;

use hoist_util::errors::HoistError;

use crate::credentials::{Credential, CredentialStore};
use crate::events::FetchEvents;

const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Stored validators from a previous response, replayed on revalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl Validators {
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }
}

/// What one download attempt produced.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The server has no such file (404/410).
    NotFound,
    /// Conditional request answered 304: the cached copy is still good.
    NotModified,
    /// Fresh bytes were written to the destination.
    Downloaded { validators: Validators },
}

enum AttemptError {
    Retryable { ssl: bool, message: String },
    Fatal(HoistError),
}

/// A reusable download engine bound to one HTTP client and credential set.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    credentials: CredentialStore,
    retry_count: u32,
    ssl_retry_count: u32,
    max_redirections: u32,
}

impl Downloader {
    pub fn new(
        client: Client,
        credentials: CredentialStore,
        retry_count: u32,
        ssl_retry_count: u32,
        max_redirections: u32,
    ) -> Self {
        Self {
            client,
            credentials,
            retry_count,
            ssl_retry_count,
            max_redirections,
        }
    }

    /// Build the HTTP client the engine expects: redirects are handled
    /// here, not by reqwest, so credential scoping stays in our hands.
    pub fn build_client(connect_timeout: Duration, read_timeout: Duration) -> miette::Result<Client> {
        Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("hoist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                HoistError::Generic {
                    message: format!("failed to create HTTP client: {e}"),
                }
                .into()
            })
    }

    /// Download `url` to `dest`, retrying transport errors and 5xx
    /// responses with exponential backoff. TLS handshake failures consume
    /// a separate budget.
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        conditional: Option<&Validators>,
        events: &dyn FetchEvents,
        cancelled: &AtomicBool,
    ) -> miette::Result<DownloadOutcome> {
        let mut transport_attempts = 0u32;
        let mut ssl_attempts = 0u32;

        loop {
            match self
                .attempt(url, dest, conditional, events, cancelled)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(AttemptError::Fatal(e)) => return Err(e.into()),
                Err(AttemptError::Retryable { ssl, message }) => {
                    let (attempts, budget) = if ssl {
                        (&mut ssl_attempts, self.ssl_retry_count)
                    } else {
                        (&mut transport_attempts, self.retry_count)
                    };
                    if *attempts >= budget {
                        return Err(HoistError::Transport {
                            url: url.to_string(),
                            message: format!("{message} (after {budget} retries)"),
                        }
                        .into());
                    }
                    let delay = BACKOFF_BASE * 2u32.pow(*attempts);
                    tracing::debug!("retrying {url} in {delay:?}: {message}");
                    tokio::time::sleep(delay).await;
                    *attempts += 1;
                }
            }
        }
    }

    /// One attempt: follow redirects until a final response, then stream it.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        conditional: Option<&Validators>,
        events: &dyn FetchEvents,
        cancelled: &AtomicBool,
    ) -> Result<DownloadOutcome, AttemptError> {
        let original = Url::parse(url).map_err(|e| {
            AttemptError::Fatal(HoistError::Config {
                message: format!("invalid URL {url}: {e}"),
            })
        })?;
        let original_origin = original.origin();
        let initial_credential = self
            .credentials
            .find_auto(
                original.host_str().unwrap_or_default(),
                original.scheme() == "https",
            )
            .cloned();

        let mut current = original;
        let mut redirects = 0u32;
        let mut challenged: Option<Credential> = None;

        loop {
            if cancelled.load(Ordering::Relaxed) {
                return Err(AttemptError::Fatal(HoistError::Cancelled));
            }

            let https = current.scheme() == "https";
            let host = current.host_str().unwrap_or_default().to_string();
            let same_origin = current.origin() == original_origin;

            let credential = if let Some(ref c) = challenged {
                Some(c.clone())
            } else if same_origin {
                initial_credential.clone()
            } else {
                // Cross-host redirect: the original credential is dropped
                // unless it is marked pass-on-redirect.
                initial_credential
                    .clone()
                    .filter(|c| c.pass_on_redirect)
            };

            let mut request = self.client.get(current.clone());
            if let Some(ref c) = credential {
                request = request.basic_auth(&c.username, Some(&c.password));
            }
            if let Some(validators) = conditional {
                if let Some(ref lm) = validators.last_modified {
                    request = request.header(reqwest::header::IF_MODIFIED_SINCE, lm.as_str());
                }
                if let Some(ref etag) = validators.etag {
                    request = request.header(reqwest::header::IF_NONE_MATCH, etag.as_str());
                }
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return Err(classify_transport(&e)),
            };
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > self.max_redirections {
                    return Err(AttemptError::Fatal(HoistError::Transport {
                        url: url.to_string(),
                        message: format!("more than {} redirections", self.max_redirections),
                    }));
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        AttemptError::Fatal(HoistError::Transport {
                            url: url.to_string(),
                            message: format!("redirect {status} without a Location header"),
                        })
                    })?;
                current = current.join(location).map_err(|e| {
                    AttemptError::Fatal(HoistError::Transport {
                        url: url.to_string(),
                        message: format!("invalid redirect target {location:?}: {e}"),
                    })
                })?;
                challenged = None;
                continue;
            }

            if status == StatusCode::NOT_MODIFIED {
                return Ok(DownloadOutcome::NotModified);
            }
            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                return Ok(DownloadOutcome::NotFound);
            }
            if status == StatusCode::UNAUTHORIZED {
                // A challenge with a realm may select a more specific
                // credential; one extra attempt with it.
                if challenged.is_none() {
                    if let Some(realm) = response
                        .headers()
                        .get(reqwest::header::WWW_AUTHENTICATE)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_realm)
                    {
                        if let Some(c) = self.credentials.find(&host, https, Some(&realm)) {
                            if Some(c) != credential.as_ref() {
                                challenged = Some(c.clone());
                                continue;
                            }
                        }
                    }
                }
                return Err(AttemptError::Fatal(HoistError::Unauthorized {
                    url: url.to_string(),
                    status: status.as_u16(),
                }));
            }
            if status == StatusCode::FORBIDDEN {
                return Err(AttemptError::Fatal(HoistError::Unauthorized {
                    url: url.to_string(),
                    status: status.as_u16(),
                }));
            }
            if status.is_server_error() {
                return Err(AttemptError::Retryable {
                    ssl: false,
                    message: format!("HTTP {status} from {current}"),
                });
            }
            if !status.is_success() {
                return Err(AttemptError::Fatal(HoistError::Transport {
                    url: url.to_string(),
                    message: format!("unexpected HTTP {status} from {current}"),
                }));
            }

            let validators = Validators {
                last_modified: header_string(&response, reqwest::header::LAST_MODIFIED),
                etag: header_string(&response, reqwest::header::ETAG),
            };
            self.stream_body(url, response, dest, events, cancelled)
                .await?;
            return Ok(DownloadOutcome::Downloaded { validators });
        }
    }

    async fn stream_body(
        &self,
        url: &str,
        response: reqwest::Response,
        dest: &Path,
        events: &dyn FetchEvents,
        cancelled: &AtomicBool,
    ) -> Result<(), AttemptError> {
        events.started(url, response.content_length());

        hoist_util::fs::ensure_parent(dest)
            .map_err(|e| AttemptError::Fatal(HoistError::Io(e)))?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| AttemptError::Fatal(HoistError::Io(e)))?;

        let mut stream = response.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            if cancelled.load(Ordering::Relaxed) {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(AttemptError::Fatal(HoistError::Cancelled));
            }
            let chunk = chunk.map_err(|e| classify_transport(&e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AttemptError::Fatal(HoistError::Io(e)))?;
            total += chunk.len() as u64;
            events.progress(url, total);
        }
        file.flush()
            .await
            .map_err(|e| AttemptError::Fatal(HoistError::Io(e)))?;
        Ok(())
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Pull `realm="..."` out of a `WWW-Authenticate` header.
fn parse_realm(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();
    let at = lower.find("realm=")?;
    let rest = &header[at + "realm=".len()..];
    if let Some(quoted) = rest.strip_prefix('"') {
        quoted.split('"').next().map(|s| s.to_string())
    } else {
        rest.split([',', ' ']).next().map(|s| s.to_string())
    }
}

fn classify_transport(error: &reqwest::Error) -> AttemptError {
    let mut text = error.to_string();
    let mut source: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(s) = source {
        text.push_str(": ");
        text.push_str(&s.to_string());
        source = s.source();
    }
    let lower = text.to_ascii_lowercase();
    let ssl = lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate")
        || lower.contains("handshake");
    AttemptError::Retryable { ssl, message: text }
}
