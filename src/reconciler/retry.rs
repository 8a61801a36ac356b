//! 重试与退避
//! 重试循环是纯函数：等待由可注入的 Sleeper 完成，测试中无需真实延迟

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{TabGroupError, TgResult};

/// 可注入的等待实现
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// 基于 tokio 定时器的等待
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 只记录等待时长、不真正等待
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}

/// 带指数退避的重试
///
/// 首次立即执行；`is_retryable` 判定为可重试的错误按策略等待后重试，
/// 其他错误或重试耗尽时返回最后一次错误。
pub async fn retry_with_backoff<T, F, Fut, R>(
    mut operation: F,
    policy: &RetryPolicy,
    is_retryable: R,
    sleeper: &dyn Sleeper,
) -> TgResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TgResult<T>>,
    R: Fn(&TabGroupError) -> bool,
{
    let max_retries = policy.max_retries();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && is_retryable(&e) => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                debug!(
                    "Retryable error, retrying in {:?} (attempt {}/{}): {}",
                    delay, attempt, max_retries, e
                );
                sleeper.sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> TabGroupError {
        TabGroupError::from_host_message("Tabs cannot be edited right now (user may be dragging a tab).")
    }

    fn millis(delays: &[Duration]) -> Vec<u128> {
        delays.iter().map(Duration::as_millis).collect()
    }

    #[tokio::test]
    async fn test_five_transient_failures_then_success() {
        let sleeper = RecordingSleeper::new();
        let attempts = AtomicU32::new(0);

        let result = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 5 { Err(locked()) } else { Ok(n) }
            },
            &RetryPolicy::default(),
            TabGroupError::is_transient,
            &sleeper,
        )
        .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        assert_eq!(millis(&sleeper.delays()), vec![25, 50, 100, 200, 400]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let attempts = AtomicU32::new(0);

        let result: TgResult<()> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(locked())
            },
            &RetryPolicy::default(),
            TabGroupError::is_transient,
            &sleeper,
        )
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
        assert_eq!(sleeper.delays().len(), 5);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let attempts = AtomicU32::new(0);

        let result: TgResult<()> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TabGroupError::from_host_message("No group with id: 7."))
            },
            &RetryPolicy::default(),
            TabGroupError::is_transient,
            &sleeper,
        )
        .await;

        assert!(result.unwrap_err().is_gone());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_never_policy() {
        let sleeper = RecordingSleeper::new();
        let result: TgResult<()> =
            retry_with_backoff(|| async { Err(locked()) }, &RetryPolicy::Never, TabGroupError::is_transient, &sleeper)
                .await;
        assert!(result.is_err());
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_total_window() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy::default();
        for n in 1..=policy.max_retries() {
            TokioSleeper.sleep(policy.delay_for(n)).await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(775) && elapsed < Duration::from_millis(800));
    }
}
