//! Rate-limited HTTP client shared by every source adapter.
//!
//! Each upstream owns one [`RateBudget`]: a single-cell `governor` limiter whose
//! period is the upstream's minimum interval. Every attempt, retries included,
//! takes a cell before it reaches the transport, so calls to one upstream start
//! at least `min_interval` apart no matter how many workers share the client.

use std::collections::HashMap;
use std::io::Read;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use serde_json::Value;

use crate::cancellation::CancelToken;
use crate::config::NetworkConfig;
use crate::error::SourceError;

pub const USER_AGENT: &str = "liner/0.1.0 (artist record resolver; contact: metadata enrichment)";
const MAX_BACKOFF: Duration = Duration::from_secs(4);
const MIN_ATTEMPTS: u32 = 2;
const MAX_ATTEMPTS: u32 = 5;

/// Rate-limited upstream host. Several adapters may share one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Spotify,
    Wikipedia,
    Wikidata,
    MusicBrainz,
    Perplexity,
}

impl Upstream {
    pub const ALL: [Upstream; 5] = [
        Upstream::Spotify,
        Upstream::Wikipedia,
        Upstream::Wikidata,
        Upstream::MusicBrainz,
        Upstream::Perplexity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Wikipedia => "wikipedia",
            Self::Wikidata => "wikidata",
            Self::MusicBrainz => "musicbrainz",
            Self::Perplexity => "perplexity",
        }
    }

    fn min_interval(self, network: &NetworkConfig) -> Duration {
        let millis = match self {
            Self::Spotify => network.spotify_interval_ms,
            Self::Wikipedia => network.wikipedia_interval_ms,
            Self::Wikidata => network.wikidata_interval_ms,
            Self::MusicBrainz => network.musicbrainz_interval_ms,
            Self::Perplexity => network.ai_interval_ms,
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(RequestBody::Form(fields)),
        }
    }

    pub fn post_json(url: impl Into<String>, body: &Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(RequestBody::Json(body.to_string())),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value, SourceError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Maps non-success statuses onto the source error taxonomy.
    pub fn ensure_success(self) -> Result<Self, SourceError> {
        match self.status {
            status if (200..300).contains(&status) => Ok(self),
            404 => Err(SourceError::NotFound),
            401 | 403 => Err(SourceError::Auth(format!("HTTP {}", self.status))),
            status => Err(SourceError::Transient(format!("HTTP {status}"))),
        }
    }
}

/// Failure below the HTTP status layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout(String),
    Connection(String),
}

impl TransportError {
    fn message(&self) -> &str {
        match self {
            Self::Timeout(message) | Self::Connection(message) => message,
        }
    }
}

/// Executes one HTTP exchange. Error statuses come back as responses.
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by `ureq`.
pub struct UreqTransport {
    http_client: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5).min(timeout))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { http_client }
    }

    fn classify_io_timeout(error: &std::io::Error) -> bool {
        matches!(
            error.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) || error.to_string().to_ascii_lowercase().contains("timed out")
    }

    fn read_body(response: ureq::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status();
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| {
                let message = format!("Failed to read response: {error}");
                if Self::classify_io_timeout(&error) {
                    TransportError::Timeout(message)
                } else {
                    TransportError::Connection(message)
                }
            })?;
        Ok(HttpResponse { status, body })
    }
}

impl HttpTransport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        let mut call = self
            .http_client
            .request(method, &request.url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", "application/json");
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let outcome = match &request.body {
            None => call.call(),
            Some(RequestBody::Form(fields)) => {
                let pairs: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                call.send_form(&pairs)
            }
            Some(RequestBody::Json(body)) => call
                .set("Content-Type", "application/json")
                .send_string(body),
        };

        match outcome {
            Ok(response) => Self::read_body(response),
            Err(ureq::Error::Status(_, response)) => Self::read_body(response),
            Err(ureq::Error::Transport(transport)) => {
                let message = format!("Request failed: {transport}");
                let lowered = message.to_ascii_lowercase();
                if lowered.contains("timed out") || lowered.contains("timeout") {
                    Err(TransportError::Timeout(message))
                } else {
                    Err(TransportError::Connection(message))
                }
            }
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Minimum spacing between calls to one upstream.
///
/// A zero interval disables the limiter. The waiter lock makes callers queue
/// for the next cell one at a time instead of all polling the limiter.
pub struct RateBudget {
    upstream: Upstream,
    limiter: Option<DirectLimiter>,
    clock: DefaultClock,
    waiters: Mutex<()>,
}

impl RateBudget {
    pub fn new(upstream: Upstream, min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            upstream,
            limiter,
            clock: DefaultClock::default(),
            waiters: Mutex::new(()),
        }
    }

    /// Blocks until the upstream may be called again and takes that slot.
    fn acquire(&self, cancel: &CancelToken) -> Result<(), SourceError> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        let _turn = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let not_until = match limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until,
            };
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let wait = not_until.wait_time_from(self.clock.now());
            debug!(
                "RateBudget[{}]: waiting {:?} before next request",
                self.upstream.label(),
                wait
            );
            std::thread::sleep(wait);
        }
    }
}

/// Supplies and refreshes bearer tokens for authenticated upstreams.
pub trait TokenProvider: Send + Sync {
    /// Returns a usable token, acquiring one if none is cached or it expired.
    fn current_token(&self, cancel: &CancelToken) -> Result<String, SourceError>;
    /// Forces one re-authentication and returns the new token.
    fn refresh_token(&self, cancel: &CancelToken) -> Result<String, SourceError>;
}

/// Shared request wrapper enforcing spacing, retries and auth refresh.
pub struct RateLimitedClient {
    transport: Arc<dyn HttpTransport>,
    budgets: HashMap<Upstream, RateBudget>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RateLimitedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, network: &NetworkConfig) -> Self {
        let budgets = Upstream::ALL
            .iter()
            .map(|upstream| {
                (
                    *upstream,
                    RateBudget::new(*upstream, upstream.min_interval(network)),
                )
            })
            .collect();
        Self {
            transport,
            budgets,
            max_attempts: network
                .max_retries
                .saturating_add(1)
                .clamp(MIN_ATTEMPTS, MAX_ATTEMPTS),
            base_delay: network.retry_base_delay(),
        }
    }

    pub fn with_ureq(network: &NetworkConfig) -> Self {
        Self::new(
            Arc::new(UreqTransport::new(network.request_timeout())),
            network,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        let multiplier = 1u32 << exponent;
        base_delay
            .checked_mul(multiplier)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    fn is_rejected_credentials(status: u16) -> bool {
        matches!(status, 401 | 403)
    }

    fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 408 | 500 | 502 | 503 | 504)
    }

    fn execute_once(
        &self,
        upstream: Upstream,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<Result<HttpResponse, TransportError>, SourceError> {
        if let Some(budget) = self.budgets.get(&upstream) {
            budget.acquire(cancel)?;
        }
        Ok(self.transport.execute(request))
    }

    /// Sends `request`, retrying transient failures with bounded backoff.
    ///
    /// Non-transient HTTP statuses (including 401 and 404) are returned as
    /// responses so adapters can apply their own interpretation.
    pub fn call(
        &self,
        upstream: Upstream,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse, SourceError> {
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let reason = match self.execute_once(upstream, request, cancel)? {
                Ok(response) if !Self::is_retryable_status(response.status) => {
                    return Ok(response)
                }
                Ok(response) => format!("HTTP {}", response.status),
                Err(error) => error.message().to_string(),
            };

            if attempt >= self.max_attempts {
                warn!(
                    "Client[{}]: giving up after {} attempt(s): {}",
                    upstream.label(),
                    attempt,
                    reason
                );
                return Err(SourceError::Transient(reason));
            }

            let backoff = Self::backoff_delay(self.base_delay, attempt);
            info!(
                "Client[{}]: attempt {} failed ({}), retrying in {:?}",
                upstream.label(),
                attempt,
                reason,
                backoff
            );
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            std::thread::sleep(backoff);
            attempt = attempt.saturating_add(1);
        }
    }

    /// Like [`call`](Self::call) with a bearer token. A 401 or 403 triggers
    /// exactly one refresh and one retry; a second rejection is `Auth`.
    pub fn call_authorized<F>(
        &self,
        upstream: Upstream,
        tokens: &dyn TokenProvider,
        cancel: &CancelToken,
        build_request: F,
    ) -> Result<HttpResponse, SourceError>
    where
        F: Fn(&str) -> HttpRequest,
    {
        let token = tokens.current_token(cancel)?;
        let response = self.call(upstream, &build_request(&token), cancel)?;
        if !Self::is_rejected_credentials(response.status) {
            return Ok(response);
        }

        info!(
            "Client[{}]: credentials rejected (HTTP {}), re-authenticating once",
            upstream.label(),
            response.status
        );
        let refreshed = tokens.refresh_token(cancel)?;
        let retried = self.call(upstream, &build_request(&refreshed), cancel)?;
        if Self::is_rejected_credentials(retried.status) {
            return Err(SourceError::Auth(format!(
                "{} rejected refreshed credentials (HTTP {})",
                upstream.label(),
                retried.status
            )));
        }
        Ok(retried)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

    /// Scripted transport: routes by URL substring and records every call.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        routes: Mutex<Vec<(String, VecDeque<Result<HttpResponse, TransportError>>)>>,
        pub(crate) calls: Mutex<Vec<(Instant, HttpRequest)>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queues a reply for URLs containing `needle`. The last reply of a
        /// route is repeated once the queue drains.
        pub(crate) fn reply(&self, needle: &str, status: u16, body: &str) -> &Self {
            self.push(
                needle,
                Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
            )
        }

        pub(crate) fn fail(&self, needle: &str, error: TransportError) -> &Self {
            self.push(needle, Err(error))
        }

        fn push(&self, needle: &str, outcome: Result<HttpResponse, TransportError>) -> &Self {
            let mut routes = self.routes.lock().unwrap();
            if let Some((_, queue)) = routes.iter_mut().find(|(key, _)| key == needle) {
                queue.push_back(outcome);
            } else {
                routes.push((needle.to_string(), VecDeque::from([outcome])));
            }
            self
        }

        pub(crate) fn call_count(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, request)| request.url.contains(needle))
                .count()
        }

        pub(crate) fn timestamps(&self, needle: &str) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, request)| request.url.contains(needle))
                .map(|(at, _)| *at)
                .collect()
        }
    }

    impl HttpTransport for FakeTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), request.clone()));
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|(needle, _)| request.url.contains(needle.as_str()));
            match route {
                Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some((_, queue)) => queue.front().cloned().unwrap(),
                None => Ok(HttpResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::testing::FakeTransport;
    use super::{
        HttpRequest, RateBudget, RateLimitedClient, TokenProvider, TransportError, Upstream,
    };
    use crate::cancellation::CancelToken;
    use crate::config::NetworkConfig;
    use crate::error::SourceError;

    fn fast_network() -> NetworkConfig {
        NetworkConfig {
            spotify_interval_ms: 0,
            wikipedia_interval_ms: 0,
            wikidata_interval_ms: 0,
            musicbrainz_interval_ms: 0,
            ai_interval_ms: 0,
            max_retries: 3,
            retry_base_delay_ms: 1,
            request_timeout_secs: 1,
        }
    }

    struct CountingTokens {
        refreshes: AtomicUsize,
    }

    impl TokenProvider for CountingTokens {
        fn current_token(&self, _cancel: &CancelToken) -> Result<String, SourceError> {
            Ok("stale".to_string())
        }

        fn refresh_token(&self, _cancel: &CancelToken) -> Result<String, SourceError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok("fresh".to_string())
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(RateLimitedClient::backoff_delay(base, 1), base);
        assert_eq!(
            RateLimitedClient::backoff_delay(base, 2),
            Duration::from_millis(1000)
        );
        assert_eq!(
            RateLimitedClient::backoff_delay(base, 9),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_attempt_bounds_are_clamped() {
        let transport = Arc::new(FakeTransport::new());
        let mut network = fast_network();
        network.max_retries = 0;
        assert_eq!(
            RateLimitedClient::new(transport.clone(), &network).max_attempts(),
            2
        );
        network.max_retries = 20;
        assert_eq!(RateLimitedClient::new(transport, &network).max_attempts(), 5);
    }

    #[test]
    fn test_transient_failures_are_retried_then_succeed() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .fail("example.org", TransportError::Timeout("timed out".to_string()))
            .reply("example.org", 503, "")
            .reply("example.org", 200, "{}");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());

        let response = client
            .call(
                Upstream::Wikipedia,
                &HttpRequest::get("https://example.org/a"),
                &CancelToken::new(),
            )
            .expect("third attempt should succeed");
        assert_eq!(response.status, 200);
        assert_eq!(transport.call_count("example.org"), 3);
    }

    #[test]
    fn test_transient_failures_surface_after_budget() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply("example.org", 502, "");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());

        let result = client.call(
            Upstream::Wikipedia,
            &HttpRequest::get("https://example.org/a"),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(SourceError::Transient(_))));
        assert_eq!(transport.call_count("example.org"), 4);
    }

    #[test]
    fn test_not_found_is_returned_without_retry() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply("example.org", 404, "");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());

        let response = client
            .call(
                Upstream::Wikipedia,
                &HttpRequest::get("https://example.org/a"),
                &CancelToken::new(),
            )
            .expect("404 is a response, not a transport failure");
        assert_eq!(response.status, 404);
        assert_eq!(transport.call_count("example.org"), 1);
    }

    #[test]
    fn test_cancelled_call_never_reaches_transport() {
        let transport = Arc::new(FakeTransport::new());
        let client = RateLimitedClient::new(transport.clone(), &fast_network());
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = client.call(
            Upstream::Wikipedia,
            &HttpRequest::get("https://example.org/a"),
            &cancel,
        );
        assert_eq!(result, Err(SourceError::Cancelled));
        assert_eq!(transport.call_count("example.org"), 0);
    }

    #[test]
    fn test_unauthorized_refreshes_once_and_retries() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply("api.example", 401, "")
            .reply("api.example", 200, "{}");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());
        let tokens = CountingTokens {
            refreshes: AtomicUsize::new(0),
        };

        let response = client
            .call_authorized(Upstream::Spotify, &tokens, &CancelToken::new(), |token| {
                HttpRequest::get("https://api.example/v1").bearer(token)
            })
            .expect("retry after refresh should succeed");
        assert_eq!(response.status, 200);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);

        let calls = transport.calls.lock().unwrap();
        let last_auth = calls
            .last()
            .and_then(|(_, request)| request.headers.first().cloned());
        assert_eq!(
            last_auth,
            Some(("Authorization".to_string(), "Bearer fresh".to_string()))
        );
    }

    #[test]
    fn test_second_unauthorized_is_auth_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply("api.example", 401, "");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());
        let tokens = CountingTokens {
            refreshes: AtomicUsize::new(0),
        };

        let result = client.call_authorized(
            Upstream::Spotify,
            &tokens,
            &CancelToken::new(),
            |token| HttpRequest::get("https://api.example/v1").bearer(token),
        );
        assert!(matches!(result, Err(SourceError::Auth(_))));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.call_count("api.example"), 2);
    }

    #[test]
    fn test_forbidden_refreshes_once_before_auth_error() {
        let transport = Arc::new(FakeTransport::new());
        transport
            .reply("api.example", 403, "")
            .reply("api.example", 200, "{}");
        let client = RateLimitedClient::new(transport.clone(), &fast_network());
        let tokens = CountingTokens {
            refreshes: AtomicUsize::new(0),
        };
        let response = client
            .call_authorized(Upstream::Spotify, &tokens, &CancelToken::new(), |token| {
                HttpRequest::get("https://api.example/v1").bearer(token)
            })
            .expect("retry after refresh should succeed");
        assert_eq!(response.status, 200);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);

        let rejecting = Arc::new(FakeTransport::new());
        rejecting.reply("api.example", 403, "");
        let client = RateLimitedClient::new(rejecting.clone(), &fast_network());
        let result = client.call_authorized(
            Upstream::Spotify,
            &tokens,
            &CancelToken::new(),
            |token| HttpRequest::get("https://api.example/v1").bearer(token),
        );
        assert!(matches!(result, Err(SourceError::Auth(_))));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 2);
        assert_eq!(rejecting.call_count("api.example"), 2);
    }

    #[test]
    fn test_zero_interval_budget_never_waits() {
        let budget = RateBudget::new(Upstream::Wikidata, Duration::ZERO);
        let started = Instant::now();
        for _ in 0..50 {
            budget.acquire(&CancelToken::new()).expect("no limiter");
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_cancelled_waiter_gives_up_its_turn() {
        let budget = RateBudget::new(Upstream::Perplexity, Duration::from_secs(30));
        budget
            .acquire(&CancelToken::new())
            .expect("first slot is free");
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        assert_eq!(budget.acquire(&cancel), Err(SourceError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_same_upstream_calls_respect_minimum_interval() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply("example.org", 200, "{}");
        let mut network = fast_network();
        network.wikipedia_interval_ms = 40;
        let client = RateLimitedClient::new(transport.clone(), &network);

        for _ in 0..3 {
            client
                .call(
                    Upstream::Wikipedia,
                    &HttpRequest::get("https://example.org/a"),
                    &CancelToken::new(),
                )
                .expect("call should succeed");
        }

        let stamps = transport.timestamps("example.org");
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(40));
        }
    }
}
