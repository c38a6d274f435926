use std::env;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_PREVIEW_QUIET_PERIOD: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: Url,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub outbound_capacity: usize,
}

impl ConnectionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            outbound_capacity: 64,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(default_backend_url())
    }
}

fn default_backend_url() -> Url {
    Url::parse(DEFAULT_BACKEND_URL).expect("default backend url is valid")
}

/// Flag, then `AIC_BACKEND_URL`, then the local default. Unparseable values
/// are logged and skipped.
pub fn resolve_backend_url(flag: &str) -> Url {
    let candidates = [
        Some(flag.to_string()),
        env::var("AIC_BACKEND_URL").ok(),
    ];
    for candidate in candidates.into_iter().flatten() {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => return url,
            Ok(url) => warn!("backend_url_scheme_unsupported: {url}"),
            Err(err) => warn!("backend_url_invalid: {trimmed}: {err}"),
        }
    }
    default_backend_url()
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}

#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Quiet period after the last material edit before a preview is requested.
    pub preview_quiet_period: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            preview_quiet_period: DEFAULT_PREVIEW_QUIET_PERIOD,
        }
    }
}
