//! 원격 호출 재시도 정책
//!
//! 고정 딜레이로 최대 N회 시도합니다. 딜레이는 시도 사이에만 들어갑니다.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// 기본 최대 시도 횟수
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 기본 시도 간 딜레이
pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (최소 1)
    pub max_attempts: u32,
    /// 실패 후 다음 시도까지의 딜레이
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// 딜레이 없는 정책 (테스트용)
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// 연산 실행 (실패 시 재시도)
    ///
    /// 모든 시도가 실패하면 마지막 에러를 반환합니다.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    tracing::debug!(
                        "{} failed: {} (attempt {}/{}), retrying in {:?}",
                        operation,
                        e,
                        attempt,
                        max_attempts,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "{} failed after {} attempts: {}",
                        operation,
                        max_attempts,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_three_attempts_with_two_delays() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let start = tokio::time::Instant::now();
        let result: Result<(), String> = policy
            .run("list", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("connection reset".to_string()) }
            })
            .await;

        assert_eq!(result, Err("connection reset".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), DEFAULT_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let start = tokio::time::Instant::now();
        let result: Result<u32, String> = policy
            .run("upload", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 2 {
                        Err("timeout".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(start.elapsed(), DEFAULT_DELAY);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::immediate(0);
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = policy
            .run("delete", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
