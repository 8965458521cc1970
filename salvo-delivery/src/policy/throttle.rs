//! Fixed delay between transport calls

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self::new(Duration::from_micros(micros))
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Sleep for the configured delay; returns immediately when disabled
    pub async fn pause(&self) {
        if self.is_enabled() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pause_waits_for_delay() {
        let throttle = Throttle::from_micros(250_000);
        let start = Instant::now();

        throttle.pause().await;

        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_throttle_does_not_wait() {
        let throttle = Throttle::default();
        let start = Instant::now();

        throttle.pause().await;

        assert!(!throttle.is_enabled());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
