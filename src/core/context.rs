//! 运行上下文：步骤之间传递的累积产物
//!
//! 由 PlanStepExecutor 独占持有；数据摘要、洞察、评审按步骤追加，创意建议整体替换，
//! top_ads 每次运行至多获取一次并缓存。循环结束后只读。

use crate::agents::{AgentKind, ContextExcerpt};
use crate::schema::{CreativeSuggestions, Evaluation, Insight, Parsed};

#[derive(Debug, Clone, PartialEq)]
pub struct DataSection {
    pub step_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsightSection {
    pub step_name: String,
    pub payload: Parsed<Vec<Insight>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSection {
    pub step_name: String,
    pub evaluation: Evaluation,
}

/// 失败步骤：报告中以占位说明展示
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step_name: String,
    pub agent: AgentKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub query: String,
    pub data_summary: Vec<DataSection>,
    pub insights: Vec<InsightSection>,
    pub top_ads: Option<String>,
    pub creative_recommendations: Option<(String, Parsed<CreativeSuggestions>)>,
    pub reviews: Vec<ReviewSection>,
    pub failures: Vec<StepFailure>,
}

impl Context {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn push_data(&mut self, step_name: &str, content: String) {
        self.data_summary.push(DataSection {
            step_name: step_name.to_string(),
            content,
        });
    }

    pub fn push_insights(&mut self, step_name: &str, payload: Parsed<Vec<Insight>>) {
        self.insights.push(InsightSection {
            step_name: step_name.to_string(),
            payload,
        });
    }

    /// 同一运行内只保留最后一次创意建议
    pub fn set_creatives(&mut self, step_name: &str, payload: Parsed<CreativeSuggestions>) {
        self.creative_recommendations = Some((step_name.to_string(), payload));
    }

    pub fn push_review(&mut self, step_name: &str, evaluation: Evaluation) {
        self.reviews.push(ReviewSection {
            step_name: step_name.to_string(),
            evaluation,
        });
    }

    pub fn record_failure(&mut self, step_name: &str, agent: AgentKind, reason: String) {
        self.failures.push(StepFailure {
            step_name: step_name.to_string(),
            agent,
            reason,
        });
    }

    /// 已累积的数据输出，每段带步骤标题
    pub fn data_summary_text(&self) -> String {
        self.data_summary
            .iter()
            .map(|s| format!("### Data Output ({}):\n{}", s.step_name, s.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 已累积的洞察（JSON 原文），每段带步骤标题
    pub fn insights_text(&self) -> String {
        self.insights
            .iter()
            .map(|s| format!("### Insights ({}):\n{}", s.step_name, s.payload.raw_json()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 所有符合 schema 的洞察，按产生顺序
    pub fn all_insights(&self) -> Vec<&Insight> {
        self.insights
            .iter()
            .filter_map(|s| s.payload.valid())
            .flatten()
            .collect()
    }

    pub fn creatives(&self) -> Option<&Parsed<CreativeSuggestions>> {
        self.creative_recommendations.as_ref().map(|(_, p)| p)
    }

    /// 给能力调用的只读摘录
    pub fn excerpt(&self) -> ContextExcerpt {
        ContextExcerpt {
            query: self.query.clone(),
            data_summary: self.data_summary_text(),
            insights: self.insights_text(),
            insight_fragments: self.insights.iter().map(|s| s.payload.raw_json()).collect(),
            top_ads: self.top_ads.clone().unwrap_or_default(),
            report: None,
        }
    }
}
