//! 执行状态：计划执行器的状态机与每步记录
//!
//! 执行器在每次状态迁移时把状态压入 trace，供日志与测试检查完整的迁移序列。

use serde::Serialize;

use crate::agents::AgentKind;

/// 计划执行状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StepState {
    Pending(usize),
    Running(usize),
    StepSucceeded(usize),
    StepFailed(usize),
    Completed,
    Aborted,
}

/// 单步结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Succeeded,
    /// 失败但运行继续；贡献被略过
    Failed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub step_name: String,
    pub agent: AgentKind,
    pub status: StepStatus,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, StepStatus::Succeeded)
    }
}
