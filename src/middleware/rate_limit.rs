use super::Middleware;
use crate::errors::{RouteConfigError, RouteError};
use crate::handlers::Handler;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Sliding-window request counter keyed by client and path
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    /// Allow `limit` requests per `window` for each key
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a request for `key`
    ///
    /// Timestamps older than the window are dropped first. When the remaining
    /// count already reaches the limit the request is rejected and nothing is
    /// recorded; otherwise the current time is recorded.
    pub fn check(&self, key: &str) -> Result<(), RouteError> {
        let now = Instant::now();
        let mut clients = self.lock();
        let times = clients.entry(key.to_string()).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);

        if times.len() >= self.limit {
            return Err(RouteError::RateLimited {
                key: key.to_string(),
                limit: self.limit,
            });
        }
        times.push(now);
        Ok(())
    }

    /// Prune expired timestamps and forget keys left empty
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < self.window);
            !times.is_empty()
        });
        before - clients.len()
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

/// Background thread that calls [`RateLimiter::sweep`] once per window
///
/// Stops when dropped: dropping the sender wakes the thread, which exits.
struct Sweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    fn spawn(limiter: Weak<RateLimiter>, window: Duration) -> Option<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("starroute-ratelimit-sweep".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(window) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(limiter) = limiter.upgrade() else {
                            break;
                        };
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, "Rate limiter swept idle keys");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        match spawned {
            Ok(handle) => Some(Self {
                stop: Some(stop),
                handle: Some(handle),
            }),
            Err(e) => {
                error!(error = %e, "Failed to spawn rate limit sweeper, idle keys will accumulate");
                None
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Rate limit sweeper panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-client, per-path sliding-window rate limiting
///
/// Requests are keyed by the client addresses joined with `:` plus the
/// request path. Rejected requests fail with [`RouteError::RateLimited`]
/// (429, `Rate limit exceeded`). The sweeper thread stops when this
/// middleware is dropped or [`RateLimitMiddleware::shutdown`] is called.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl RateLimitMiddleware {
    /// Allow `requests` per `per` for each client and path, with a sweeper
    ///
    /// # Errors
    ///
    /// Returns [`RouteConfigError::InvalidRateLimit`] for an empty window,
    /// which would never reject and would spin the sweeper.
    pub fn new(requests: usize, per: Duration) -> Result<Self, RouteConfigError> {
        if per.is_zero() {
            return Err(RouteConfigError::InvalidRateLimit {
                reason: "window must be longer than zero".to_string(),
            });
        }
        let limiter = Arc::new(RateLimiter::new(requests, per));
        let sweeper = Sweeper::spawn(Arc::downgrade(&limiter), per);
        Ok(Self {
            limiter,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Shared limiter state
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether the background sweeper is running
    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        match self.sweeper.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Stop the sweeper thread and wait for it to exit
    pub fn shutdown(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sweeper);
    }
}

impl Middleware for RateLimitMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        let limiter = Arc::clone(&self.limiter);
        Arc::new(move |res, req| {
            let key = format!("{}:{}", req.client_ips().join(":"), req.path());
            if let Err(err) = limiter.check(&key) {
                warn!(key = %key, limit = limiter.limit, "Rate limit exceeded");
                return Err(err);
            }
            next(res, req)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_reached_rejects() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        assert!(matches!(
            limiter.check("a"),
            Err(RouteError::RateLimited { limit: 2, .. })
        ));
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        thread::sleep(Duration::from_millis(50));
        assert!(limiter.check("a").is_ok());
    }

    #[test]
    fn test_sweep_forgets_idle_keys() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20));
        limiter.check("a").unwrap();
        limiter.check("b").unwrap();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(limiter.sweep(), 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_shutdown_stops_sweeper() {
        let mw = RateLimitMiddleware::new(5, Duration::from_millis(10)).unwrap();
        assert!(mw.sweeper_running());
        mw.shutdown();
        assert!(!mw.sweeper_running());
    }

    #[test]
    fn test_zero_window_is_rejected() {
        assert!(matches!(
            RateLimitMiddleware::new(5, Duration::ZERO),
            Err(RouteConfigError::InvalidRateLimit { .. })
        ));
    }
}
