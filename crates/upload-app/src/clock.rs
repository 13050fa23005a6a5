//! The production [`Clock`] implementation; tests use
//! `upload_test_support::FixedClock` instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use upload_core::ports::Clock;

/// Wall-clock time via [`Utc::now`] and real `tokio` sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: std::time::Duration) {
        tokio::time::sleep(duration).await;
    }
}
