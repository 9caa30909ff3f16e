//! リトライとポーリングのポリシー
//!
//! [`RetryPolicy`] は一時的な失敗後に1回のリモート呼び出しを繰り返す回数の上限。
//! [`PollPolicy`] はコントロールプレーンの収束 (コマンドキュー、プロビジョニング)
//! を待つ時間の上限。

use crate::error::{CloudError, RemoteError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

/// 一時的な失敗に対する上限付き指数バックオフ
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 初回を含む総試行回数
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// リトライしないポリシー
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after the given zero-based attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(self.initial_delay, self.max_delay, self.multiplier, attempt)
    }
}

/// コントロールプレーンの収束待ち (上限付き)
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,

    /// 1.0 なら固定間隔でポーリング
    pub multiplier: f64,

    /// 1回の待機の合計時間
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            multiplier: 1.5,
            timeout: Duration::from_secs(40 * 60),
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1.0,
            timeout,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(self.interval, self.max_interval, self.multiplier, attempt)
    }
}

/// `initial * multiplier^attempt` (上限 `max`、1未満の倍率は1として扱う)
fn backoff(initial: Duration, max: Duration, multiplier: f64, attempt: u32) -> Duration {
    let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = initial.as_secs_f64() * multiplier.powi(exponent);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// 値が得られるか、ポリシーの時間予算が尽きるまで `check` を繰り返す
///
/// リモート側が収束中の間、`check` は `Ok(None)` を返す。エラーは即座に待機を中断する。
/// 返された future を drop するとポーリングは止まるが、リモート操作はそのまま続く。
pub async fn poll_until<F, Fut, T>(policy: &PollPolicy, operation: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(CloudError::Remote(RemoteError::ProvisioningTimeout {
                operation: operation.to_string(),
                waited,
            }));
        }

        let delay = policy
            .delay_for_attempt(attempt)
            .min(policy.timeout.saturating_sub(waited));
        debug!(operation = %operation, attempt, delay_ms = delay.as_millis() as u64, "still waiting");
        sleep(delay).await;
        attempt += 1;
    }
}
