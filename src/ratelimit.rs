use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use log::*;

/// Sliding window limiter: at most `limit` sends in any trailing `window`.
#[derive(Debug, Clone)]
pub struct RateLimit {
    limit: usize,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RateLimit {
    /// The chat service allows 20 messages per 30 seconds, plus some slack.
    pub const MESSAGES: usize = 20;
    pub const WINDOW: Duration = Duration::from_secs(31);

    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            history: VecDeque::with_capacity(limit),
        }
    }

    /// How long a send at `now` would have to wait, if at all.
    pub fn delay(&mut self, now: Instant) -> Option<Duration> {
        let window = self.window;
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.history.pop_front();
        }

        if self.history.len() < self.limit {
            return None;
        }

        let oldest = *self.history.front()?;
        Some(window - now.saturating_duration_since(oldest))
    }

    /// Records a send that happened at `now`.
    pub fn record(&mut self, now: Instant) {
        self.history.push_back(now);
    }

    /// Blocks until a send is allowed.
    pub fn wait(&mut self) {
        while let Some(delay) = self.delay(Instant::now()) {
            debug!(
                "rate limited ({} in {:?}), waiting {:?}",
                self.history.len(),
                self.window,
                delay
            );
            thread::sleep(delay);
        }
    }

    pub fn in_window(&self) -> usize {
        self.history.len()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(Self::MESSAGES, Self::WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let mut limit = RateLimit::default();
        let start = Instant::now();
        for _ in 0..RateLimit::MESSAGES {
            assert_eq!(limit.delay(start), None);
            limit.record(start);
        }

        assert_eq!(limit.delay(start), Some(RateLimit::WINDOW));
        assert_eq!(
            limit.delay(start + Duration::from_secs(30)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(limit.delay(start + RateLimit::WINDOW), None);
        assert_eq!(limit.in_window(), 0);
    }

    #[test]
    fn window_slides() {
        let mut limit = RateLimit::new(3, Duration::from_secs(10));
        let start = Instant::now();
        let at = |secs| start + Duration::from_secs(secs);

        for &t in &[0, 4, 8] {
            assert_eq!(limit.delay(at(t)), None);
            limit.record(at(t));
        }

        // the first one leaves the window at 10
        assert_eq!(limit.delay(at(9)), Some(Duration::from_secs(1)));
        assert_eq!(limit.delay(at(10)), None);
        limit.record(at(10));

        // now the one from 4 is oldest
        assert_eq!(limit.delay(at(11)), Some(Duration::from_secs(3)));
    }

    #[test]
    fn never_more_than_limit_in_window() {
        let window = Duration::from_millis(100);
        let mut limit = RateLimit::new(4, window);
        let mut sent = vec![];
        for _ in 0..10 {
            limit.wait();
            let now = Instant::now();
            limit.record(now);
            sent.push(now);
        }

        for (i, &t) in sent.iter().enumerate() {
            let within = sent[i..]
                .iter()
                .take_while(|&&s| s.duration_since(t) < window)
                .count();
            assert!(within <= 4, "{} sends inside one window", within);
        }
    }
}
