//! 管线错误分类与步骤失败后的处置动作
//!
//! 与 RecoveryEngine 配合：根据 PipelineError 决定 SkipStep（部分失败继续）或 Abort（终止整次运行）。

use thiserror::Error;

/// 被包装的底层原因
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 错误种类标签（用于 RetryPolicy 的 fatal 集合匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Execution,
    UnknownAgent,
    Unclassified,
}

/// 管线运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 输入数据不符合预期 schema，永不重试
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// 能力调用在重试耗尽后仍未得到可用结果
    #[error("Execution failed in {context} after {attempts} attempt(s): {message}")]
    Execution {
        context: String,
        message: String,
        attempts: u32,
        #[source]
        source: Option<BoxError>,
    },

    /// 计划引用了未注册的能力
    #[error("Unknown agent '{agent}' in step '{step_name}'")]
    UnknownAgent { agent: String, step_name: String },

    /// 未分类的底层失败（LLM 传输、JSON 解析、IO 等）；ExecutionGuard 重试耗尽后包装为 Execution
    #[error("{message}")]
    Unclassified {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    pub fn execution(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            context: context.into(),
            message: message.into(),
            attempts: 1,
            source: None,
        }
    }

    pub fn unknown_agent(agent: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self::UnknownAgent {
            agent: agent.into(),
            step_name: step_name.into(),
        }
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified {
            message: message.into(),
            source: None,
        }
    }

    /// 将任意底层错误作为 Unclassified 的 cause 保留
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unclassified {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::UnknownAgent { .. } => ErrorKind::UnknownAgent,
            Self::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }

    /// 是否属于分类体系（Validation / Execution / UnknownAgent）；这类错误不会被再次包装
    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Unclassified { .. })
    }

    /// Execution 错误记录的总尝试次数
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Execution { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// 重试耗尽后的包装：未分类错误变为 Execution，已分类错误原样返回
    pub(crate) fn into_execution(self, context: &str, attempts: u32) -> Self {
        match self {
            Self::Unclassified { .. } => Self::Execution {
                context: context.to_string(),
                message: self.to_string(),
                attempts,
                source: Some(Box::new(self)),
            },
            classified => classified,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::other(err)
    }
}

/// 恢复引擎对失败步骤给出的处置动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 记录失败、略过该步骤的贡献，继续下一步
    SkipStep(String),
    /// 终止整次运行并向调用方传播错误
    Abort,
}
