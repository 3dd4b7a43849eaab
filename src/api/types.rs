//! Shared types for the API layer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

/// Failed logins allowed per username before the lockout kicks in.
const LOCKOUT_MAX_FAILURES: u32 = 5;
const LOCKOUT_WINDOW: Duration = Duration::from_secs(300);

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
/// How often idle keys are dropped from the limiter and lockout maps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `CoreState` plus API-specific throttling state.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub login_lockout: Arc<Mutex<LoginLockout>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        let limiter = RateLimiter::new(core.config.rate_per_minute, core.config.rate_per_hour);
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(limiter)),
            login_lockout: Arc::new(Mutex::new(LoginLockout::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: sliding window per client key
// ═══════════════════════════════════════════════════════════

/// Sliding-window request counter per client key, with a per-minute and a
/// per-hour ceiling. Keys with no hits in the last hour are swept.
pub struct RateLimiter {
    hits: HashMap<String, VecDeque<Instant>>,
    per_minute: u32,
    per_hour: u32,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            hits: HashMap::new(),
            per_minute,
            per_hour,
            last_sweep: Instant::now(),
        }
    }

    /// Count one request for `key`. `Err(retry_after_secs)` when either
    /// window is full; rejected requests are not counted.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        if now.saturating_duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.sweep(now);
        }

        let hits = self.hits.entry(key.to_string()).or_default();
        while hits
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= HOUR)
        {
            hits.pop_front();
        }

        if hits.len() >= self.per_hour as usize {
            return Err(retry_after(hits.front(), HOUR, now));
        }
        let recent = hits
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < MINUTE)
            .count();
        if recent >= self.per_minute as usize {
            let oldest_recent = recent.checked_sub(1).and_then(|i| hits.iter().rev().nth(i));
            return Err(retry_after(oldest_recent, MINUTE, now));
        }

        hits.push_back(now);
        Ok(())
    }

    /// Drop keys whose hour window is empty.
    pub(crate) fn sweep(&mut self, now: Instant) {
        self.hits.retain(|_, hits| {
            hits.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < HOUR)
        });
        self.last_sweep = now;
    }

    pub(crate) fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

/// Seconds until `oldest` leaves a window of length `window`, at least 1.
fn retry_after(oldest: Option<&Instant>, window: Duration, now: Instant) -> u64 {
    oldest
        .map(|t| window.saturating_sub(now.saturating_duration_since(*t)))
        .map_or(window.as_secs(), |left| left.as_secs())
        .max(1)
}

// ═══════════════════════════════════════════════════════════
// Login lockout: per-username failure counter
// ═══════════════════════════════════════════════════════════

struct FailureRecord {
    count: u32,
    last: Instant,
}

/// Blocks a username for a fixed window after repeated failed logins.
pub struct LoginLockout {
    failures: HashMap<String, FailureRecord>,
    max_failures: u32,
    window: Duration,
    last_sweep: Instant,
}

impl LoginLockout {
    pub fn new() -> Self {
        Self::with_limits(LOCKOUT_MAX_FAILURES, LOCKOUT_WINDOW)
    }

    pub fn with_limits(max_failures: u32, window: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            max_failures,
            window,
            last_sweep: Instant::now(),
        }
    }

    /// `Err(retry_after_secs)` while the username is locked.
    pub fn check(&mut self, username: &str) -> Result<(), u64> {
        let Some(record) = self.failures.get(username) else {
            return Ok(());
        };
        let elapsed = record.last.elapsed();
        if elapsed >= self.window {
            self.failures.remove(username);
            return Ok(());
        }
        if record.count >= self.max_failures {
            return Err((self.window - elapsed).as_secs().max(1));
        }
        Ok(())
    }

    pub fn record_failure(&mut self, username: &str) {
        self.record_failure_at(username, Instant::now());
    }

    pub(crate) fn record_failure_at(&mut self, username: &str, now: Instant) {
        let window = self.window;
        if now.saturating_duration_since(self.last_sweep) >= window.max(SWEEP_INTERVAL) {
            self.failures
                .retain(|_, r| now.saturating_duration_since(r.last) < window);
            self.last_sweep = now;
        }
        let record = self
            .failures
            .entry(username.to_string())
            .or_insert(FailureRecord { count: 0, last: now });
        if now.saturating_duration_since(record.last) >= window {
            record.count = 0;
        }
        record.count += 1;
        record.last = now;
    }

    pub fn clear(&mut self, username: &str) {
        self.failures.remove(username);
    }

    pub(crate) fn tracked_usernames(&self) -> usize {
        self.failures.len()
    }
}

impl Default for LoginLockout {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Extractors: axum extractors whose rejections use ApiError
// ═══════════════════════════════════════════════════════════

/// `Json<T>` with the structured error body on malformed input.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Path<T>` with the structured error body on malformed ids.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `Query<T>` with the structured error body on malformed filters.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_within_limit() {
        let mut limiter = RateLimiter::new(100, 2000);
        for _ in 0..100 {
            assert!(limiter.check("peer:10.0.0.1").is_ok());
        }
        assert!(limiter.check("peer:10.0.0.1").is_err());
    }

    #[test]
    fn minute_window_slides() {
        let mut limiter = RateLimiter::new(2, 100);
        let t0 = Instant::now();
        assert!(limiter.check_at("user:a", t0).is_ok());
        assert!(limiter.check_at("user:a", t0 + Duration::from_secs(30)).is_ok());

        let retry = limiter.check_at("user:a", t0 + Duration::from_secs(40)).unwrap_err();
        assert_eq!(retry, 20);

        // First hit has left the window, the second has not
        assert!(limiter.check_at("user:a", t0 + Duration::from_secs(61)).is_ok());
        assert!(limiter.check_at("user:a", t0 + Duration::from_secs(62)).is_err());
    }

    #[test]
    fn hour_limit_reports_time_to_oldest_expiry() {
        let mut limiter = RateLimiter::new(100, 3);
        let t0 = Instant::now();
        for i in 0..3 {
            assert!(limiter.check_at("user:a", t0 + Duration::from_secs(i * 120)).is_ok());
        }
        let retry = limiter.check_at("user:a", t0 + Duration::from_secs(600)).unwrap_err();
        assert_eq!(retry, 3000);
        assert!(limiter.check_at("user:a", t0 + Duration::from_secs(3600)).is_ok());
    }

    #[test]
    fn rejected_requests_are_not_counted() {
        let mut limiter = RateLimiter::new(1, 100);
        let t0 = Instant::now();
        assert!(limiter.check_at("peer:x", t0).is_ok());
        for s in 1..50 {
            assert!(limiter.check_at("peer:x", t0 + Duration::from_millis(s * 100)).is_err());
        }
        assert!(limiter.check_at("peer:x", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn rate_limiter_tracks_clients_independently() {
        let mut limiter = RateLimiter::new(1, 10);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn zero_limit_rejects_without_panicking() {
        let mut limiter = RateLimiter::new(0, 10);
        assert_eq!(limiter.check("a"), Err(60));
    }

    #[test]
    fn idle_keys_are_swept() {
        let mut limiter = RateLimiter::new(10, 100);
        let t0 = Instant::now();
        for i in 0..500 {
            limiter.check_at(&format!("peer:{i}"), t0).unwrap();
        }
        assert_eq!(limiter.tracked_keys(), 500);

        // The next check after the sweep interval drops keys idle for an hour
        limiter.check_at("peer:fresh", t0 + HOUR).unwrap();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn lockout_after_max_failures() {
        let mut lockout = LoginLockout::new();
        for _ in 0..LOCKOUT_MAX_FAILURES - 1 {
            lockout.record_failure("nurse.joy");
            assert!(lockout.check("nurse.joy").is_ok());
        }
        lockout.record_failure("nurse.joy");
        let retry = lockout.check("nurse.joy").unwrap_err();
        assert!(retry > 0 && retry <= LOCKOUT_WINDOW.as_secs());
        assert!(lockout.check("dr.house").is_ok());
    }

    #[test]
    fn lockout_clears_on_success() {
        let mut lockout = LoginLockout::with_limits(2, LOCKOUT_WINDOW);
        lockout.record_failure("nurse.joy");
        lockout.clear("nurse.joy");
        lockout.record_failure("nurse.joy");
        assert!(lockout.check("nurse.joy").is_ok());
    }

    #[test]
    fn lockout_expires_after_window() {
        let mut lockout = LoginLockout::with_limits(1, Duration::ZERO);
        lockout.record_failure("nurse.joy");
        assert!(lockout.check("nurse.joy").is_ok());
    }

    #[test]
    fn stale_lockout_records_are_swept() {
        let mut lockout = LoginLockout::new();
        let t0 = Instant::now();
        for i in 0..200 {
            lockout.record_failure_at(&format!("guess{i}"), t0);
        }
        assert_eq!(lockout.tracked_usernames(), 200);
        lockout.record_failure_at("nurse.joy", t0 + LOCKOUT_WINDOW);
        assert_eq!(lockout.tracked_usernames(), 1);
    }
}
