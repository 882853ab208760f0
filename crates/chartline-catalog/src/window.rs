//! Daily window of stream counts to collect for one track

use chrono::{Days, NaiveDate};

/// Inclusive date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StreamWindow {
    /// Choose the window for a track charted on `reference`.
    ///
    /// The anchor is whichever of `release` and `reference - lookback_days` is
    /// nearer to `reference` in absolute days; ties pick `release`. The window
    /// spans `window_days` days from the anchor. Returns `None` when the anchor
    /// falls after `reference`, i.e. a release a few days in the future.
    pub fn anchored(
        release: NaiveDate,
        reference: NaiveDate,
        lookback_days: i64,
        window_days: i64,
    ) -> Option<Self> {
        let limit = reference - chrono::Duration::days(lookback_days);
        let distance = |d: NaiveDate| (reference - d).num_days().abs();
        let anchor = if distance(release) <= distance(limit) {
            release
        } else {
            limit
        };
        if anchor > reference {
            return None;
        }
        let span = u64::try_from(window_days.max(1) - 1).unwrap_or(0);
        let end = anchor.checked_add_days(Days::new(span))?;
        Some(Self { start: anchor, end })
    }

    /// Every date in the window, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}
