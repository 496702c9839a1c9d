//! 分析管线：规划 -> 逐步执行 -> 组装报告 -> 评审 -> 落盘
//!
//! Planner 以抛出模式守护：规划失败或计划为空时没有任何步骤可执行，整次运行终止。
//! 最终评审以吞掉模式守护：评审失败只会得到 "Evaluation unavailable" 的兜底结果。

use std::path::PathBuf;
use std::sync::Arc;

use crate::agents::{
    AgentCapability, AgentKind, AgentOutput, AgentRegistry, ContextExcerpt, CreativeGenerator,
    DataAgent, Evaluator, GuardedAgent, InsightAgent, PlannerAgent, PromptSet,
};
use crate::config::AppConfig;
use crate::core::{
    Context, ExecutionGuard, ExecutionOutcome, ExecutorConfig, PipelineError, PlanStepExecutor,
    RetryPolicy, StepRecord, StepState,
};
use crate::data::AdsTable;
use crate::llm::{create_groq_client, LlmClient};
use crate::observability::Telemetry;
use crate::report::{assemble, ArtifactWriter, ReportArtifacts, WrittenArtifacts};
use crate::schema::{Evaluation, Plan};

/// 最终评审交给 Evaluator 的指令
pub const REVIEW_INSTRUCTION: &str = "Review the final report";

/// 组装管线所需的能力
pub struct PipelineParts {
    pub planner: Arc<dyn AgentCapability>,
    pub registry: AgentRegistry,
    /// 最终评审；None 时跳过评审
    pub reviewer: Option<Arc<dyn AgentCapability>>,
    /// 用于汇总 token 使用量
    pub llms: Vec<Arc<dyn LlmClient>>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub policy: RetryPolicy,
    pub executor: ExecutorConfig,
    pub output_dir: PathBuf,
}

/// 一次完成（可能部分降级）的运行
#[derive(Debug)]
pub struct RunSummary {
    pub plan: Plan,
    pub records: Vec<StepRecord>,
    pub trace: Vec<StepState>,
    pub evaluation: Evaluation,
    pub artifacts: WrittenArtifacts,
}

impl RunSummary {
    pub fn failed_steps(&self) -> usize {
        self.records.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn is_degraded(&self) -> bool {
        self.failed_steps() > 0
    }
}

pub struct AnalysisPipeline {
    planner: GuardedAgent,
    reviewer: Option<Arc<dyn AgentCapability>>,
    review_guard: ExecutionGuard,
    executor: PlanStepExecutor,
    writer: ArtifactWriter,
    llms: Vec<Arc<dyn LlmClient>>,
}

impl AnalysisPipeline {
    pub fn new(parts: PipelineParts, settings: PipelineSettings, telemetry: Telemetry) -> Self {
        Self {
            planner: GuardedAgent::new(parts.planner, settings.policy.clone()),
            reviewer: parts.reviewer,
            review_guard: ExecutionGuard::new("Evaluator.review", settings.policy),
            executor: PlanStepExecutor::new(Arc::new(parts.registry), settings.executor, telemetry),
            writer: ArtifactWriter::new(settings.output_dir),
            llms: parts.llms,
        }
    }

    /// 按配置创建 Groq 客户端、读取数据并注册全部能力；数据不合法时返回 Validation
    pub fn from_config(
        cfg: &AppConfig,
        api_key: &str,
        telemetry: Telemetry,
    ) -> Result<Self, PipelineError> {
        let table = Arc::new(AdsTable::load(&cfg.data.csv_path)?);
        let prompts = PromptSet::load(cfg.app.prompts_dir.as_deref());

        let llm: Arc<dyn LlmClient> = Arc::new(create_groq_client(
            api_key,
            Some(cfg.llm.model.as_str()),
            cfg.llm.base_url.as_deref(),
            cfg.llm.temperature,
        ));
        let creative_llm: Arc<dyn LlmClient> = Arc::new(create_groq_client(
            api_key,
            Some(cfg.llm.model.as_str()),
            cfg.llm.base_url.as_deref(),
            cfg.llm.creative_temperature,
        ));
        tracing::info!(model = %cfg.llm.model, rows = table.len(), "Initializing agents");

        let policy = cfg.guard.retry_policy();
        let evaluator: Arc<dyn AgentCapability> =
            Arc::new(Evaluator::new(llm.clone(), &prompts.evaluator, telemetry.clone()));

        let mut registry = AgentRegistry::new();
        registry.register(
            Arc::new(DataAgent::new(llm.clone(), table, &prompts.data_agent, telemetry.clone())),
            policy.clone(),
        );
        registry.register(
            Arc::new(InsightAgent::new(llm.clone(), &prompts.insight, telemetry.clone())),
            policy.clone(),
        );
        registry.register(
            Arc::new(CreativeGenerator::new(
                creative_llm.clone(),
                &prompts.creative,
                telemetry.clone(),
            )),
            policy.clone(),
        );
        registry.register(evaluator.clone(), policy.clone());

        let parts = PipelineParts {
            planner: Arc::new(PlannerAgent::new(llm.clone(), &prompts.planner, telemetry.clone())),
            registry,
            reviewer: Some(evaluator),
            llms: vec![llm, creative_llm],
        };
        let settings = PipelineSettings {
            policy,
            executor: cfg.pipeline.executor_config(),
            output_dir: cfg.app.output_dir.clone(),
        };
        Ok(Self::new(parts, settings, telemetry))
    }

    pub async fn run(&self, query: &str) -> Result<RunSummary, PipelineError> {
        tracing::info!("Starting analysis for: '{}'", query);

        let plan = self.plan(query).await?;
        let execution = self.executor.execute(query, &plan).await?;

        tracing::info!("Compiling final report...");
        let artifacts = assemble(&execution.context);
        let evaluation = self.review(&execution.context, &artifacts).await;
        let written = self.writer.write(&artifacts, &evaluation)?;

        let (prompt, completion, total) = self.token_usage();
        tracing::info!(
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            failed_steps = execution.failed_steps(),
            "Analysis complete, report saved to {}",
            written.report.display()
        );

        Ok(RunSummary {
            plan,
            records: execution.records,
            trace: execution.trace,
            evaluation,
            artifacts: written,
        })
    }

    async fn plan(&self, query: &str) -> Result<Plan, PipelineError> {
        tracing::info!("Planner: creating execution plan...");
        let output = self
            .planner
            .invoke(query, &ContextExcerpt::for_query(query))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Planning failed"))?;
        let plan = match output {
            AgentOutput::Plan(plan) => plan,
            other => return Err(other.mismatch(AgentKind::Planner, "Plan")),
        };
        if plan.is_empty() {
            tracing::error!("Planner returned an empty plan");
            return Err(PipelineError::execution(
                "Planner.invoke",
                "planner returned an empty plan",
            ));
        }
        tracing::info!(steps = plan.len(), "Plan created with {} steps", plan.len());
        Ok(plan)
    }

    /// 评审最终报告；任何失败都降级为不可用的评估结果
    async fn review(&self, context: &Context, artifacts: &ReportArtifacts) -> Evaluation {
        let Some(reviewer) = &self.reviewer else {
            return Evaluation::unavailable("no evaluator configured");
        };
        tracing::info!("Evaluator: reviewing report...");

        let mut excerpt = context.excerpt();
        excerpt.report = Some(artifacts.markdown.clone());
        let excerpt = &excerpt;
        let outcome = self
            .review_guard
            .run_or(Evaluation::unavailable("review failed"), move || async move {
                match reviewer.invoke(REVIEW_INSTRUCTION, excerpt).await? {
                    AgentOutput::Review(evaluation) => Ok(evaluation),
                    other => Err(other.mismatch(AgentKind::Evaluator, "Review")),
                }
            })
            .await;

        match outcome {
            ExecutionOutcome::Success(evaluation) => {
                tracing::info!(
                    score = ?evaluation.score,
                    passed = evaluation.passed(),
                    "Evaluator result: {}",
                    evaluation.verdict
                );
                evaluation
            }
            ExecutionOutcome::Failure { error, .. } => Evaluation::unavailable(error.to_string()),
        }
    }

    /// 所有 LLM 客户端的累计 token
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llms.iter().fold((0, 0, 0), |acc, llm| {
            let (p, c, t) = llm.token_usage();
            (acc.0 + p, acc.1 + c, acc.2 + t)
        })
    }
}
