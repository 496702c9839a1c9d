//! 计划执行器：顺序控制循环
//!
//! Pending(i) -> Running(i) -> StepSucceeded(i) / StepFailed(i) -> Pending(i+1) ... -> Completed；
//! Validation / UnknownAgent 错误使运行进入 Aborted（完整迁移序列写入 error 日志）并向调用方传播。每步结束后（无论成败）
//! 固定等待 step_delay，以遵守 LLM 服务的吞吐限制；测试中设为 0。

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{AgentCapability, AgentKind, AgentOutput, AgentRegistry};
use crate::core::{
    Context, PipelineError, RecoveryAction, RecoveryEngine, StepRecord, StepState, StepStatus,
};
use crate::observability::{summarize, Telemetry};
use crate::schema::{Plan, PlanStep};

/// 隐式获取 top ads 失败时缓存的占位内容
pub const TOP_ADS_UNAVAILABLE: &str = "(top performing ads unavailable)";

/// Debug 日志中单步输出的最大预览字符数
const STEP_OUTPUT_PREVIEW_CHARS: usize = 200;

/// 执行器配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 每步之后的固定间隔；Duration::ZERO 关闭
    pub step_delay: Duration,
    /// CreativeGenerator 缺少 top_ads 时交给 DataAgent 的指令
    pub top_ads_instruction: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(5),
            top_ads_instruction: "Get top 5 ads by ROAS with their creative messages".to_string(),
        }
    }
}

/// 一次完整执行（Completed）的结果
#[derive(Debug)]
pub struct ExecutionReport {
    pub context: Context,
    pub records: Vec<StepRecord>,
    pub trace: Vec<StepState>,
}

impl ExecutionReport {
    pub fn failed_steps(&self) -> usize {
        self.records.iter().filter(|r| !r.succeeded()).count()
    }
}

pub struct PlanStepExecutor {
    registry: Arc<AgentRegistry>,
    recovery: RecoveryEngine,
    config: ExecutorConfig,
    telemetry: Telemetry,
}

impl PlanStepExecutor {
    pub fn new(registry: Arc<AgentRegistry>, config: ExecutorConfig, telemetry: Telemetry) -> Self {
        Self {
            registry,
            recovery: RecoveryEngine::new(),
            config,
            telemetry,
        }
    }

    /// 顺序执行计划；Aborted 时返回触发终止的错误
    pub async fn execute(&self, query: &str, plan: &Plan) -> Result<ExecutionReport, PipelineError> {
        let steps = self.resolve(plan)?;
        let mut context = Context::new(query);
        let mut records = Vec::with_capacity(steps.len());
        let mut trace = Vec::with_capacity(steps.len() * 3 + 1);

        for (i, (kind, agent, step)) in steps.into_iter().enumerate() {
            trace.push(StepState::Pending(i));
            tracing::info!(
                step = i + 1,
                agent = %kind,
                "▶ Step {}: {} ({}) - {}",
                i + 1,
                step.step_name,
                kind,
                step.description
            );

            trace.push(StepState::Running(i));
            match self.dispatch(kind, agent.as_ref(), step, &mut context).await {
                Ok(()) => {
                    trace.push(StepState::StepSucceeded(i));
                    tracing::info!(step = i + 1, "Step {} completed", i + 1);
                    records.push(StepRecord {
                        index: i,
                        step_name: step.step_name.clone(),
                        agent: kind,
                        status: StepStatus::Succeeded,
                    });
                }
                Err(err) => {
                    trace.push(StepState::StepFailed(i));
                    match self.recovery.handle(&err) {
                        RecoveryAction::SkipStep(reason) => {
                            tracing::warn!(
                                step = i + 1,
                                agent = %kind,
                                error = ?err,
                                "Step {} failed, continuing without its output",
                                i + 1
                            );
                            context.record_failure(&step.step_name, kind, reason.clone());
                            records.push(StepRecord {
                                index: i,
                                step_name: step.step_name.clone(),
                                agent: kind,
                                status: StepStatus::Failed(reason),
                            });
                        }
                        RecoveryAction::Abort => {
                            trace.push(StepState::Aborted);
                            tracing::error!(
                                step = i + 1,
                                agent = %kind,
                                error = ?err,
                                trace = ?trace,
                                "Step {} failed fatally, aborting run",
                                i + 1
                            );
                            return Err(err);
                        }
                    }
                }
            }

            self.pace().await;
        }

        trace.push(StepState::Completed);
        Ok(ExecutionReport {
            context,
            records,
            trace,
        })
    }

    /// 在派发任何步骤之前解析全部 agent 名称；未知或未注册则立即失败
    fn resolve<'p>(
        &self,
        plan: &'p Plan,
    ) -> Result<Vec<(AgentKind, Arc<dyn AgentCapability>, &'p PlanStep)>, PipelineError> {
        let mut resolved = Vec::with_capacity(plan.len());
        for step in plan.steps() {
            let kind = step
                .agent
                .parse::<AgentKind>()
                .ok()
                .filter(AgentKind::is_step_agent)
                .ok_or_else(|| PipelineError::unknown_agent(&step.agent, &step.step_name))?;
            let agent = self
                .registry
                .get(kind)
                .ok_or_else(|| PipelineError::unknown_agent(kind.as_str(), &step.step_name))?;
            // CreativeGenerator 依赖 DataAgent 获取 top ads
            if kind == AgentKind::CreativeGenerator && !self.registry.contains(AgentKind::DataAgent) {
                return Err(PipelineError::unknown_agent(
                    AgentKind::DataAgent.as_str(),
                    &step.step_name,
                ));
            }
            resolved.push((kind, agent, step));
        }
        Ok(resolved)
    }

    async fn dispatch(
        &self,
        kind: AgentKind,
        agent: &dyn AgentCapability,
        step: &PlanStep,
        context: &mut Context,
    ) -> Result<(), PipelineError> {
        if kind == AgentKind::CreativeGenerator {
            self.ensure_top_ads(context).await?;
        }

        let output = agent.invoke(&step.description, &context.excerpt()).await?;
        tracing::debug!(
            step = %step.step_name,
            output = %summarize(&format!("{output:?}"), STEP_OUTPUT_PREVIEW_CHARS),
            "Step output"
        );

        match (kind, output) {
            (AgentKind::DataAgent, AgentOutput::DataTable(table)) => {
                context.push_data(&step.step_name, table);
            }
            (AgentKind::InsightAgent, AgentOutput::Insights(payload)) => {
                context.push_insights(&step.step_name, payload);
            }
            (AgentKind::CreativeGenerator, AgentOutput::Creatives(payload)) => {
                context.set_creatives(&step.step_name, payload);
            }
            (AgentKind::Evaluator, AgentOutput::Review(evaluation)) => {
                context.push_review(&step.step_name, evaluation);
            }
            (kind, other) => {
                let expected = match kind {
                    AgentKind::DataAgent => "DataTable",
                    AgentKind::InsightAgent => "Insights",
                    AgentKind::CreativeGenerator => "Creatives",
                    AgentKind::Evaluator => "Review",
                    AgentKind::Planner => "Plan",
                };
                return Err(other.mismatch(kind, expected));
            }
        }
        Ok(())
    }

    /// 每次运行至多获取一次 top ads；Execution 失败时缓存占位内容，致命错误照常上抛
    async fn ensure_top_ads(&self, context: &mut Context) -> Result<(), PipelineError> {
        if context.top_ads.is_some() {
            return Ok(());
        }
        let Some(data_agent) = self.registry.get(AgentKind::DataAgent) else {
            return Err(PipelineError::unknown_agent(
                AgentKind::DataAgent.as_str(),
                "implicit top ads fetch",
            ));
        };

        tracing::info!("Fetching top ads for context...");
        let fetched = data_agent
            .invoke(&self.config.top_ads_instruction, &context.excerpt())
            .await;
        let top_ads = match fetched {
            Ok(AgentOutput::DataTable(table)) => table,
            Ok(other) => {
                tracing::warn!(
                    output = other.variant_name(),
                    "Top ads fetch returned unexpected output"
                );
                TOP_ADS_UNAVAILABLE.to_string()
            }
            Err(err) if matches!(self.recovery.handle(&err), RecoveryAction::SkipStep(_)) => {
                tracing::warn!(error = %err, "Top ads fetch failed, continuing without examples");
                TOP_ADS_UNAVAILABLE.to_string()
            }
            Err(err) => return Err(err),
        };
        self.telemetry.decision(
            AgentKind::DataAgent.as_str(),
            &self.config.top_ads_instruction,
            &top_ads,
            "Cached top performing ads for creative generation",
        );
        context.top_ads = Some(top_ads);
        Ok(())
    }

    async fn pace(&self) {
        if self.config.step_delay.is_zero() {
            return;
        }
        tracing::info!(
            "Waiting {:.1}s to respect API rate limits...",
            self.config.step_delay.as_secs_f64()
        );
        tokio::time::sleep(self.config.step_delay).await;
    }
}
