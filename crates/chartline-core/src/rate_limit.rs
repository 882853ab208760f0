//! Sliding-window admission control for outbound calls

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// At most `max_calls` admissions within any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateProfile {
    pub window: Duration,
    pub max_calls: usize,
}

impl RateProfile {
    /// Catalog endpoints: 60 calls per 30s
    pub const CATALOG: Self = Self {
        window: Duration::from_secs(30),
        max_calls: 60,
    };

    /// Stream-count endpoint: 20 calls per 60s
    pub const STREAMS: Self = Self {
        window: Duration::from_secs(60),
        max_calls: 20,
    };
}

/// Endpoint family sharing one rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Catalog,
    Streams,
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Catalog => "catalog",
            Self::Streams => "streams",
        })
    }
}

/// Sliding-window limiter over recorded call timestamps.
///
/// Timestamps at or before `now - window` are pruned lazily on each
/// admission. Not thread-safe: exactly one caller owns it.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    profile: RateProfile,
    stamps: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(profile: RateProfile) -> Self {
        assert!(profile.max_calls > 0, "rate profile must allow at least one call");
        Self {
            profile,
            stamps: VecDeque::with_capacity(profile.max_calls),
        }
    }

    pub fn profile(&self) -> RateProfile {
        self.profile
    }

    /// Number of timestamps still inside the window as of the last admission.
    pub fn live_calls(&self) -> usize {
        self.stamps.len()
    }

    /// Block until one more call fits the window, then record it.
    ///
    /// Returns the total time spent sleeping.
    pub fn admit(&mut self, clock: &dyn Clock) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let now = clock.now();
            self.prune(now);
            if self.stamps.len() < self.profile.max_calls {
                self.stamps.push_back(now);
                return waited;
            }

            let oldest = self.stamps[0];
            let wait = (oldest + self.profile.window).saturating_duration_since(now);
            log::info!(
                "Rate limit reached ({} calls / {}s). Waiting for {:.3} seconds.",
                self.profile.max_calls,
                self.profile.window.as_secs(),
                wait.as_secs_f64()
            );
            clock.sleep(wait);
            waited += wait;
        }
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.profile.window) else {
            return;
        };
        while self.stamps.front().is_some_and(|&t| t <= cutoff) {
            self.stamps.pop_front();
        }
    }
}

/// One limiter per endpoint class.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    catalog: RateLimiter,
    streams: RateLimiter,
}

impl RateLimiters {
    pub fn new(catalog: RateProfile, streams: RateProfile) -> Self {
        Self {
            catalog: RateLimiter::new(catalog),
            streams: RateLimiter::new(streams),
        }
    }

    pub fn get_mut(&mut self, class: EndpointClass) -> &mut RateLimiter {
        match class {
            EndpointClass::Catalog => &mut self.catalog,
            EndpointClass::Streams => &mut self.streams,
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(RateProfile::CATALOG, RateProfile::STREAMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn profile(secs: u64, max_calls: usize) -> RateProfile {
        RateProfile {
            window: Duration::from_secs(secs),
            max_calls,
        }
    }

    /// Count admissions in the half-open window (t - window, t].
    fn max_in_any_window(stamps: &[Instant], window: Duration) -> usize {
        stamps
            .iter()
            .map(|&end| {
                stamps
                    .iter()
                    .filter(|&&t| t <= end && end.saturating_duration_since(t) < window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn under_limit_never_waits() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(profile(30, 5));
        for _ in 0..5 {
            assert_eq!(limiter.admit(&clock), Duration::ZERO);
        }
        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.live_calls(), 5);
    }

    #[test]
    fn full_window_waits_for_oldest_to_expire() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(profile(30, 3));
        limiter.admit(&clock);
        clock.advance(Duration::from_secs(10));
        limiter.admit(&clock);
        limiter.admit(&clock);

        // oldest is 10s old, so 20s remain in its window
        let waited = limiter.admit(&clock);
        assert_eq!(waited, Duration::from_secs(20));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(20)]);
        assert_eq!(limiter.live_calls(), 3);
    }

    #[test]
    fn expired_stamps_pruned_without_waiting() {
        let clock = ManualClock::new();
        let mut limiter = RateLimiter::new(profile(60, 2));
        limiter.admit(&clock);
        limiter.admit(&clock);
        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.admit(&clock), Duration::ZERO);
        assert_eq!(limiter.live_calls(), 1);
    }

    #[test]
    fn window_never_exceeds_limit() {
        // deterministic pseudo-random gaps
        let gaps = [0u64, 0, 1, 0, 5, 0, 0, 13, 2, 0, 0, 0, 29, 1, 0, 7, 0, 0, 3, 0];
        for &(secs, max) in &[(30u64, 60usize), (60, 20), (10, 3), (5, 1)] {
            let clock = ManualClock::new();
            let mut limiter = RateLimiter::new(profile(secs, max));
            let mut stamps = Vec::new();
            for i in 0..200 {
                clock.advance(Duration::from_secs(gaps[i % gaps.len()]) / 4);
                limiter.admit(&clock);
                stamps.push(clock.now());
            }
            let window = Duration::from_secs(secs);
            assert!(
                max_in_any_window(&stamps, window) <= max,
                "profile {secs}s/{max} exceeded"
            );
        }
    }

    #[test]
    fn limiters_are_independent_per_class() {
        let clock = ManualClock::new();
        let mut limiters = RateLimiters::new(profile(30, 1), profile(60, 1));
        limiters.get_mut(EndpointClass::Catalog).admit(&clock);
        // streams window is untouched by catalog traffic
        assert_eq!(
            limiters.get_mut(EndpointClass::Streams).admit(&clock),
            Duration::ZERO
        );
        assert_eq!(
            limiters.get_mut(EndpointClass::Catalog).admit(&clock),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn default_profiles() {
        assert_eq!(RateProfile::CATALOG, profile(30, 60));
        assert_eq!(RateProfile::STREAMS, profile(60, 20));
    }
}
