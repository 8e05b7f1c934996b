//! Token-bucket rate limiting of the sending direction.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Limits outbound envelopes to a fixed rate per second.
///
/// Works on any envelope kind; register one instance in each pipeline to
/// rate-limit, or share one instance across pipelines for a combined
/// budget. Sends are delayed until a token is available, never dropped.
/// The bucket holds one second of burst.
pub struct ThroughputControlModule {
    rate_per_second: u32,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl ThroughputControlModule {
    pub fn new(rate_per_second: u32) -> Arc<Self> {
        Arc::new(Self {
            rate_per_second: rate_per_second.max(1),
            bucket: Mutex::new(Bucket {
                tokens: rate_per_second.max(1) as f64,
                last_refill: Instant::now(),
            }),
        })
    }

    async fn acquire(&self) {
        let rate = f64::from(self.rate_per_second);
        let capacity = rate;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill);
                bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(capacity);
                bucket.last_refill = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl<T: Send + 'static> crate::module::ChannelModule<T> for ThroughputControlModule {
    async fn on_sending(&self, envelope: T) -> Option<T> {
        self.acquire().await;
        Some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ChannelModule;

    #[tokio::test(start_paused = true)]
    async fn burst_within_the_bucket_passes_immediately() {
        let module = ThroughputControlModule::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            ChannelModule::<u32>::on_sending(&*module, 1).await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_delays_the_send() {
        let module = ThroughputControlModule::new(2);
        for _ in 0..2 {
            ChannelModule::<u32>::on_sending(&*module, 1).await;
        }
        let start = Instant::now();
        // Third send waits for the next token, half a second at 2/s.
        ChannelModule::<u32>::on_sending(&*module, 1).await;
        let waited = Instant::now().duration_since(start);
        assert!(waited >= Duration::from_millis(490), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn never_drops() {
        let module = ThroughputControlModule::new(1);
        for i in 0..3u32 {
            let out = ChannelModule::<u32>::on_sending(&*module, i).await;
            assert_eq!(out, Some(i));
        }
    }
}
