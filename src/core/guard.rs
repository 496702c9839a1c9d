//! ExecutionGuard：有界重试、指数退避与错误重分类
//!
//! 把任意「零参数、可失败」的异步操作包起来：最多尝试 retries+1 次；fatal 种类的错误不重试；
//! 第 i 次失败（i 从 0 开始）后等待 backoff × 2^i；耗尽后要么返回兜底值（吞掉），
//! 要么抛出错误（未分类错误包装为 Execution，已分类错误原样抛出）。

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::core::{ErrorKind, PipelineError};

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 失败后的最大重试次数（总尝试次数 = retries + 1）
    pub retries: u32,
    /// 退避基数 B，第 i 次重试前等待 B × 2^i
    pub backoff: Duration,
    /// 永不重试的错误种类
    pub fatal: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// fatal 默认为 Validation 与 UnknownAgent
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self {
            retries,
            backoff,
            fatal: [ErrorKind::Validation, ErrorKind::UnknownAgent]
                .into_iter()
                .collect(),
        }
    }

    /// 只尝试一次
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// 替换 fatal 集合
    pub fn with_fatal(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.fatal = kinds.into_iter().collect();
        self
    }

    pub fn is_fatal(&self, kind: ErrorKind) -> bool {
        self.fatal.contains(&kind)
    }

    /// 第 attempt 次失败后的等待时长：backoff × 2^attempt（溢出时饱和）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// 失败处置：向上抛出，或返回兜底值
#[derive(Debug)]
pub enum OnFailure<T> {
    Propagate,
    Fallback(T),
}

/// 被守护调用的结果；不存在「部分成功」的中间态
#[derive(Debug)]
pub enum ExecutionOutcome<T> {
    Success(T),
    /// 吞掉错误并返回兜底值，保留最终错误供调用方记录
    Failure { fallback: T, error: PipelineError },
}

impl<T> ExecutionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Success(value) => value,
            Self::Failure { fallback, .. } => fallback,
        }
    }
}

/// 执行守卫：持有上下文标签（出现在日志与 Execution 错误中）与重试策略。
///
/// 无内部可变状态，多次调用之间互不影响。
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    label: String,
    policy: RetryPolicy,
}

impl ExecutionGuard {
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    /// 按 on_failure 决定抛出还是兜底
    pub async fn run<T, F, Fut>(
        &self,
        on_failure: OnFailure<T>,
        op: F,
    ) -> Result<ExecutionOutcome<T>, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        match on_failure {
            OnFailure::Propagate => self.run_or_raise(op).await.map(ExecutionOutcome::Success),
            OnFailure::Fallback(fallback) => Ok(self.run_or(fallback, op).await),
        }
    }

    /// 抛出模式
    pub async fn run_or_raise<T, F, Fut>(&self, op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        self.attempt_all(op).await
    }

    /// 吞掉模式：失败时返回 fallback
    pub async fn run_or<T, F, Fut>(&self, fallback: T, op: F) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        match self.attempt_all(op).await {
            Ok(value) => ExecutionOutcome::Success(value),
            Err(error) => {
                tracing::warn!(
                    context = %self.label,
                    error = %error,
                    "Returning fallback value"
                );
                ExecutionOutcome::Failure { fallback, error }
            }
        }
    }

    async fn attempt_all<T, F, Fut>(&self, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let total = self.policy.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!(
                context = %self.label,
                attempt = attempt + 1,
                total,
                "Starting {}",
                self.label
            );

            let err = match op().await {
                Ok(value) => {
                    tracing::debug!(context = %self.label, attempt = attempt + 1, "Completed successfully");
                    return Ok(value);
                }
                Err(err) => err,
            };

            tracing::warn!(
                context = %self.label,
                attempt = attempt + 1,
                error = %err,
                "Error in {} (attempt {})",
                self.label,
                attempt + 1
            );

            if self.policy.is_fatal(err.kind()) {
                tracing::error!(
                    context = %self.label,
                    kind = ?err.kind(),
                    "Fatal error, not retrying"
                );
                return Err(err);
            }

            if attempt < self.policy.retries {
                let delay = self.policy.delay_for_attempt(attempt);
                tracing::info!(
                    context = %self.label,
                    attempt = attempt + 1,
                    backoff_ms = delay.as_millis() as u64,
                    "Retrying in {:.2}s",
                    delay.as_secs_f64()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
                continue;
            }

            tracing::error!(
                context = %self.label,
                attempts = total,
                error = ?err,
                "Failed {} after {} attempts",
                self.label,
                total
            );
            return Err(err.into_execution(&self.label, total));
        }
    }
}
