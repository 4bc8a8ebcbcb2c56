use pkg_constants::client::{DEFAULT_CLIENT_BURST, DEFAULT_CLIENT_QPS};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Client-side token bucket: `qps` tokens per second, at most `burst` banked.
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    /// Non-positive or non-finite settings fall back to the client defaults.
    pub fn new(qps: f32, burst: i32) -> Self {
        let qps = if qps.is_finite() && qps > 0.0 {
            qps
        } else {
            DEFAULT_CLIENT_QPS
        };
        let burst = f64::from(if burst > 0 { burst } else { DEFAULT_CLIENT_BURST });
        Self {
            qps: f64::from(qps),
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        let wait = {
            let mut bucket = self.state.lock().await;
            let now = Instant::now();
            let refill = now.duration_since(bucket.last).as_secs_f64() * self.qps;
            bucket.tokens = (bucket.tokens + refill).min(self.burst);
            bucket.last = now;
            // Reserve the token now; a negative balance is the queue.
            bucket.tokens -= 1.0;
            if bucket.tokens >= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(-bucket.tokens / self.qps)
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
