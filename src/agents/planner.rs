//! Planner：把用户问题拆成有序步骤
//!
//! 调用 LLM 得到 JSON 计划；兼容 `{"steps": [...]}` 与直接返回步骤数组两种写法。
//! 回复中没有 JSON 或结构不符都属于未分类错误，交给 ExecutionGuard 重试。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::json::extract_json;
use crate::agents::prompts::render;
use crate::agents::{AgentCapability, AgentKind, AgentOutput, ContextExcerpt};
use crate::core::PipelineError;
use crate::llm::{complete_once, LlmClient};
use crate::observability::Telemetry;
use crate::schema::{Plan, PlanStep};

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanReply {
    Wrapped(Plan),
    Bare(Vec<PlanStep>),
}

/// 解析模型给出的计划文本
pub fn parse_plan(reply: &str) -> Result<Plan, PipelineError> {
    let json = extract_json(reply)
        .ok_or_else(|| PipelineError::unclassified("Planner reply contained no JSON plan"))?;
    let plan = match serde_json::from_str::<PlanReply>(json) {
        Ok(PlanReply::Wrapped(plan)) => plan,
        Ok(PlanReply::Bare(steps)) => Plan::new(steps),
        Err(e) => {
            return Err(PipelineError::Unclassified {
                message: format!("Planner reply is not a valid plan: {e}"),
                source: Some(Box::new(e)),
            })
        }
    };
    Ok(plan)
}

pub struct PlannerAgent {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    telemetry: Telemetry,
}

impl PlannerAgent {
    /// `template` 中的 `{schema}` 会被替换为 Plan 的 JSON Schema
    pub fn new(llm: Arc<dyn LlmClient>, template: &str, telemetry: Telemetry) -> Self {
        Self {
            llm,
            system_prompt: render::<Plan>(template),
            telemetry,
        }
    }
}

#[async_trait]
impl AgentCapability for PlannerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Planner
    }

    /// instruction 即用户问题
    async fn invoke(
        &self,
        instruction: &str,
        _excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        tracing::info!(query = %instruction, "Creating plan");
        let reply = complete_once(self.llm.as_ref(), &self.system_prompt, instruction).await?;
        let plan = parse_plan(&reply)?;

        let outline = plan
            .steps()
            .iter()
            .map(|s| format!("{} ({})", s.step_name, s.agent))
            .collect::<Vec<_>>()
            .join(" -> ");
        self.telemetry.decision(
            AgentKind::Planner.as_str(),
            instruction,
            &outline,
            &format!("Created plan with {} steps", plan.len()),
        );
        Ok(AgentOutput::Plan(plan))
    }
}
