//! 步骤失败恢复策略
//!
//! 根据 PipelineError 的种类返回 RecoveryAction：Validation / UnknownAgent 终止整次运行，
//! Execution（以及漏网的未分类错误）只让当前步骤失败，运行继续。

use crate::core::{PipelineError, RecoveryAction};

/// 把步骤错误映射为处置动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &PipelineError) -> RecoveryAction {
        match err {
            PipelineError::Validation { .. } | PipelineError::UnknownAgent { .. } => {
                RecoveryAction::Abort
            }
            PipelineError::Execution { .. } | PipelineError::Unclassified { .. } => {
                RecoveryAction::SkipStep(err.to_string())
            }
        }
    }
}
