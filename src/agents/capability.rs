//! 能力注册表
//!
//! 所有智能体实现 AgentCapability（kind / invoke），由 AgentRegistry 按 AgentKind 注册与查找；
//! 注册时统一套上 GuardedAgent，使每次调用都经过 ExecutionGuard 的重试与错误重分类。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{ExecutionGuard, PipelineError, RetryPolicy};
use crate::schema::{CreativeSuggestions, Evaluation, Insight, Parsed, Plan};

/// 能力角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AgentKind {
    Planner,
    DataAgent,
    InsightAgent,
    CreativeGenerator,
    Evaluator,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "Planner",
            Self::DataAgent => "DataAgent",
            Self::InsightAgent => "InsightAgent",
            Self::CreativeGenerator => "CreativeGenerator",
            Self::Evaluator => "Evaluator",
        }
    }

    /// 可以出现在计划步骤里的角色（Planner 只负责生成计划）
    pub fn is_step_agent(&self) -> bool {
        !matches!(self, Self::Planner)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ();

    /// 忽略大小写与空白；兼容 "Data Agent"、"data_agent" 之类写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "planner" | "planneragent" => Ok(Self::Planner),
            "dataagent" => Ok(Self::DataAgent),
            "insightagent" => Ok(Self::InsightAgent),
            "creativegenerator" => Ok(Self::CreativeGenerator),
            "evaluator" | "evaluatoragent" => Ok(Self::Evaluator),
            _ => Err(()),
        }
    }
}

/// 能力调用可读取的上下文摘录
#[derive(Debug, Clone, Default)]
pub struct ContextExcerpt {
    pub query: String,
    pub data_summary: String,
    pub insights: String,
    /// 每个洞察步骤的 JSON 原文（供统计严谨性检查）
    pub insight_fragments: Vec<String>,
    pub top_ads: String,
    /// 最终报告；仅在评审整份报告时存在
    pub report: Option<String>,
}

impl ContextExcerpt {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// 能力输出：按角色打标签，由执行器在编译期区分而非运行时探测
#[derive(Debug, Clone)]
pub enum AgentOutput {
    Plan(Plan),
    DataTable(String),
    Insights(Parsed<Vec<Insight>>),
    Creatives(Parsed<CreativeSuggestions>),
    Review(Evaluation),
}

impl AgentOutput {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Plan(_) => "Plan",
            Self::DataTable(_) => "DataTable",
            Self::Insights(_) => "Insights",
            Self::Creatives(_) => "Creatives",
            Self::Review(_) => "Review",
        }
    }

    /// 输出与角色不匹配时的错误
    pub fn mismatch(&self, agent: AgentKind, expected: &str) -> PipelineError {
        PipelineError::execution(
            format!("{agent}.invoke"),
            format!("expected {expected} output, got {}", self.variant_name()),
        )
    }
}

/// 智能体能力 trait：名称由 kind 给出，invoke 接收指令与上下文摘录
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn invoke(
        &self,
        instruction: &str,
        excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError>;
}

/// 装饰器：每次 invoke 都经 ExecutionGuard（抛出模式）执行
pub struct GuardedAgent {
    inner: Arc<dyn AgentCapability>,
    guard: ExecutionGuard,
}

impl GuardedAgent {
    pub fn new(inner: Arc<dyn AgentCapability>, policy: RetryPolicy) -> Self {
        let guard = ExecutionGuard::new(format!("{}.invoke", inner.kind()), policy);
        Self { inner, guard }
    }
}

#[async_trait]
impl AgentCapability for GuardedAgent {
    fn kind(&self) -> AgentKind {
        self.inner.kind()
    }

    async fn invoke(
        &self,
        instruction: &str,
        excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        let inner = &self.inner;
        self.guard
            .run_or_raise(move || inner.invoke(instruction, excerpt))
            .await
    }
}

/// 能力注册表：按 AgentKind 存储已守护的 Arc<dyn AgentCapability>
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn AgentCapability>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册并套上 ExecutionGuard
    pub fn register(&mut self, agent: Arc<dyn AgentCapability>, policy: RetryPolicy) {
        let kind = agent.kind();
        self.agents
            .insert(kind, Arc::new(GuardedAgent::new(agent, policy)));
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentCapability>> {
        self.agents.get(&kind).cloned()
    }

    pub fn contains(&self, kind: AgentKind) -> bool {
        self.agents.contains_key(&kind)
    }

    /// 已注册角色名，按名称排序（用于日志与 prompt）
    pub fn agent_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.agents.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AgentCapability for Flaky {
        fn kind(&self) -> AgentKind {
            AgentKind::DataAgent
        }

        async fn invoke(
            &self,
            instruction: &str,
            _excerpt: &ContextExcerpt,
        ) -> Result<AgentOutput, PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(PipelineError::unclassified("503 from provider"))
            } else {
                Ok(AgentOutput::DataTable(format!("table for {instruction}")))
            }
        }
    }

    #[test]
    fn test_agent_kind_parsing() {
        assert_eq!("DataAgent".parse(), Ok(AgentKind::DataAgent));
        assert_eq!("creative_generator".parse(), Ok(AgentKind::CreativeGenerator));
        assert_eq!(" Insight Agent ".parse(), Ok(AgentKind::InsightAgent));
        assert!("WeatherAgent".parse::<AgentKind>().is_err());
        assert!(!AgentKind::Planner.is_step_agent());
    }

    #[tokio::test]
    async fn test_registered_agents_are_guarded() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let mut registry = AgentRegistry::new();
        registry.register(flaky.clone(), RetryPolicy::new(3, Duration::ZERO));

        let agent = registry.get(AgentKind::DataAgent).unwrap();
        let out = agent
            .invoke("summarize", &ContextExcerpt::default())
            .await
            .unwrap();
        assert!(matches!(out, AgentOutput::DataTable(ref t) if t == "table for summarize"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_guarded_agent_wraps_exhausted_failures() {
        let flaky = Arc::new(Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let guarded = GuardedAgent::new(flaky, RetryPolicy::new(1, Duration::ZERO));
        let err = guarded
            .invoke("x", &ContextExcerpt::default())
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), Some(2));
        assert!(err.to_string().contains("DataAgent.invoke"));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AgentRegistry::new();
        assert!(!registry.contains(AgentKind::DataAgent));
        registry.register(
            Arc::new(Flaky {
                failures: 0,
                calls: AtomicU32::new(0),
            }),
            RetryPolicy::no_retry(),
        );
        assert!(registry.contains(AgentKind::DataAgent));
        assert_eq!(registry.agent_names(), vec!["DataAgent"]);
    }
}
