//! 帯域制限
//!
//! 全接続で共有するトークンバケット。単位は Mbit/s、0 は無制限。
//! バケット容量は 1 秒分で、足りない分は後払いにして呼び出し側を待たせる。

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// 共有トークンバケット
pub struct BandwidthLimiter {
    /// バイト/秒。0 なら無制限
    rate: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    /// `bytes` を消費し、残高がマイナスなら待つべき時間を返す
    fn reserve(&mut self, rate: f64, bytes: usize, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.tokens -= bytes as f64;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / rate)
        }
    }
}

impl BandwidthLimiter {
    /// # 引数
    /// - `mbit_per_sec`: 上限。0 で無制限
    pub fn new(mbit_per_sec: u64) -> Self {
        let rate = mbit_per_sec as f64 * 1_000_000.0 / 8.0;
        BandwidthLimiter {
            rate,
            bucket: Mutex::new(Bucket {
                tokens: rate,
                last: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    /// バイト/秒
    pub fn bytes_per_sec(&self) -> f64 {
        self.rate
    }

    /// `bytes` 分の送信枠を取る
    pub async fn acquire(&self, bytes: usize) {
        if self.is_unlimited() {
            return;
        }
        let wait = self.bucket.lock().await.reserve(self.rate, bytes, Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
