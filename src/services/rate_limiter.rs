//! 限流 - 业务能力层
//!
//! 两道相互独立的闸门，派发请求前都必须通过：
//! 1. 在途请求数（`Semaphore`），与 token 成本无关
//! 2. 令牌桶：容量 `capacity`，每秒补充 `refill_rate`
//!
//! 令牌桶采用"先预留、再等待"：在锁内补充并扣减，余额可以为负，
//! 负数部分按补充速率换算成一次等待时间，释放锁后只睡一次。
//! 这样任意长度为 W 的窗口内放行的 token 不超过 `capacity + refill_rate * W`。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

/// 准入凭证，持有期间占用一个在途请求名额
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    /// 为获得准入而等待的时间
    pub waited: Duration,
}

/// 限流能力接口
///
/// 编排层只依赖这个 trait，可以替换成其他准入策略。
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// 挂起直到可以派发一个预计消耗 `estimated_tokens` 的请求
    async fn acquire(&self, estimated_tokens: usize) -> AppResult<Admission>;
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: Instant,
}

/// 令牌桶 + 并发上限
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_rate: f64,
    in_flight: Arc<Semaphore>,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// 创建限流器，桶初始为满
    ///
    /// 参数的合法性由 `Config::validate` 保证。
    pub fn new(capacity: usize, refill_rate: f64, max_in_flight: usize) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            state: Mutex::new(BucketState {
                available: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 预留 `amount` 个 token，返回需要等待的时间
    ///
    /// 只在锁内做补充与扣减，不跨越任何挂起点。
    fn reserve(&self, amount: f64) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.available = (state.available + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        state.available -= amount;
        if state.available >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.available / self.refill_rate)
        }
    }

    /// 当前可用 token 数（含尚未结算的补充）
    pub fn available_tokens(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = Instant::now()
            .saturating_duration_since(state.last_refill)
            .as_secs_f64();
        (state.available + elapsed * self.refill_rate).min(self.capacity)
    }
}

#[async_trait]
impl AdmissionGate for TokenBucketLimiter {
    async fn acquire(&self, estimated_tokens: usize) -> AppResult<Admission> {
        let started = Instant::now();

        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::AdmissionClosed)?;

        let mut amount = estimated_tokens as f64;
        if amount > self.capacity {
            tracing::warn!(
                "请求预计消耗 {} token，超过令牌桶容量 {}，按容量计",
                estimated_tokens,
                self.capacity
            );
            amount = self.capacity;
        }

        let wait = self.reserve(amount);
        if !wait.is_zero() {
            tracing::debug!("令牌桶余额不足，等待 {:.2}s 后放行", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }

        Ok(Admission {
            _permit: permit,
            waited: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_admits_immediately() {
        let limiter = TokenBucketLimiter::new(1_000, 100.0, 4);
        let admission = limiter.acquire(400).await.unwrap();
        assert_eq!(admission.waited, Duration::ZERO);
        assert!((limiter.available_tokens() - 600.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deficit_waits_exactly_once() {
        let limiter = TokenBucketLimiter::new(1_000, 100.0, 4);
        drop(limiter.acquire(1_000).await.unwrap());

        // 桶已空，再要 250 个需要 2.5 秒
        let admission = limiter.acquire(250).await.unwrap();
        assert_eq!(admission.waited, Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let limiter = TokenBucketLimiter::new(500, 50.0, 4);
        drop(limiter.acquire(500).await.unwrap());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available_tokens() - 500.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_gate_is_independent_of_tokens() {
        let limiter = Arc::new(TokenBucketLimiter::new(10_000, 1_000.0, 1));
        let first = limiter.acquire(1).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await.map(|a| a.waited) })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let waited = waiter.await.unwrap().unwrap();
        assert_eq!(waited, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_window_bound() {
        let capacity = 1_000usize;
        let refill_rate = 200.0;
        let limiter = Arc::new(TokenBucketLimiter::new(capacity, refill_rate, 8));
        let origin = Instant::now();

        let requests: Vec<usize> = (0..40).map(|i| 100 + (i * 37) % 400).collect();
        let admitted = join_all(requests.iter().map(|&tokens| {
            let limiter = limiter.clone();
            async move {
                let _admission = limiter.acquire(tokens).await.unwrap();
                let at = Instant::now().duration_since(origin).as_secs_f64();
                // 模拟请求耗时，占住在途名额
                tokio::time::sleep(Duration::from_millis(50)).await;
                (at, tokens)
            }
        }))
        .await;

        for &(start, _) in &admitted {
            for window in [0.0, 0.5, 1.0, 2.5, 10.0] {
                let consumed: usize = admitted
                    .iter()
                    .filter(|(at, _)| *at >= start && *at <= start + window)
                    .map(|(_, tokens)| tokens)
                    .sum();
                // tokio 计时器精度为 1ms，放行时刻最多被推后 1ms
                let bound = capacity as f64 + refill_rate * (window + 0.001);
                assert!(
                    consumed as f64 <= bound + 1e-6,
                    "window [{start}, {}] consumed {consumed} > {bound}",
                    start + window
                );
            }
        }
    }
}
