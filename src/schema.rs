//! 数据模型：计划、洞察、创意建议、评估结果
//!
//! 所有会出现在 LLM 输出中的结构都派生 JsonSchema，由 prompts 把 schema 嵌入系统提示词。

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 单个计划步骤：`agent` 保留模型给出的原始名称，由执行器解析为已注册的能力
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    /// Name of the step
    pub step_name: String,
    /// Detailed instruction for the agent performing this step
    pub description: String,
    /// Which agent performs this step: DataAgent, InsightAgent, CreativeGenerator or Evaluator
    pub agent: String,
}

impl PlanStep {
    pub fn new(
        step_name: impl Into<String>,
        agent: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            description: description.into(),
            agent: agent.into(),
        }
    }
}

/// 有序计划；创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 支撑假设的单条证据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evidence {
    /// The metric that changed (e.g. 'ctr', 'cpm')
    pub metric: String,
    /// The change value (e.g. '-32%', '+15%')
    pub delta: String,
    /// The segment where this was observed (e.g. 'Campaign A')
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(s)
    }
}

/// 结构化洞察；evidence 为空时不具备统计有效性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Insight {
    /// The core hypothesis for the performance change
    pub hypothesis: String,
    /// Data points supporting the hypothesis
    pub evidence: Vec<Evidence>,
    pub impact: Impact,
    /// Confidence score between 0.0 and 1.0
    pub confidence: f64,
    /// How the evidence supports the hypothesis
    pub reasoning: String,
}

impl Insight {
    pub fn is_statistically_valid(&self) -> bool {
        !self.evidence.is_empty() && (0.0..=1.0).contains(&self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeRecommendation {
    pub campaign_name: String,
    pub current_performance_issue: String,
    pub suggested_headline: String,
    pub suggested_message: String,
    /// How this creative addresses the specific insight
    pub reasoning: String,
}

/// 创意建议批次（creatives.json 的顶层结构）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeSuggestions {
    pub recommendations: Vec<CreativeRecommendation>,
}

/// Evaluator 的 LLM 评审结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewVerdict {
    /// Overall quality score from 0 to 10
    pub score: f64,
    /// One-sentence verdict
    pub verdict: String,
    /// Concrete problems found, empty when none
    #[serde(default)]
    pub issues: Vec<String>,
}

/// 评估结果：统计严谨性检查 + 可选的 LLM 评审
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: Option<f64>,
    pub verdict: String,
    pub issues: Vec<String>,
    pub rigor_errors: Vec<String>,
}

impl Evaluation {
    pub fn from_verdict(verdict: ReviewVerdict, rigor_errors: Vec<String>) -> Self {
        Self {
            score: Some(verdict.score),
            verdict: verdict.verdict,
            issues: verdict.issues,
            rigor_errors,
        }
    }

    /// 评估失败时的兜底结果
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            score: None,
            verdict: format!("Evaluation unavailable: {}", reason.into()),
            issues: Vec::new(),
            rigor_errors: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.rigor_errors.is_empty() && self.issues.is_empty() && self.score.is_some()
    }
}

/// 结构化片段：符合 schema 时为 Valid，否则保留原文与原因供报告展示占位说明
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Valid(T),
    Malformed { raw: String, reason: String },
}

impl<T: DeserializeOwned> Parsed<T> {
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<T>(raw) {
            Ok(value) => Self::Valid(value),
            Err(e) => Self::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

impl<T: Serialize> Parsed<T> {
    /// 原始 JSON 文本：Valid 重新序列化，Malformed 返回模型原文
    pub fn raw_json(&self) -> String {
        match self {
            Self::Valid(value) => serde_json::to_string(value).unwrap_or_default(),
            Self::Malformed { raw, .. } => raw.clone(),
        }
    }
}

impl<T> Parsed<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Malformed { .. } => None,
        }
    }
}

/// 洞察数组；兼容 `{"insights": [...]}` 包装
pub fn parse_insights(raw: &str) -> Parsed<Vec<Insight>> {
    #[derive(Deserialize)]
    struct Wrapped {
        insights: Vec<Insight>,
    }

    match Parsed::<Vec<Insight>>::from_json(raw) {
        Parsed::Malformed { raw, reason } => match serde_json::from_str::<Wrapped>(&raw) {
            Ok(w) => Parsed::Valid(w.insights),
            Err(_) => Parsed::Malformed { raw, reason },
        },
        valid => valid,
    }
}

/// 创意建议；兼容直接返回数组
pub fn parse_creatives(raw: &str) -> Parsed<CreativeSuggestions> {
    match Parsed::<CreativeSuggestions>::from_json(raw) {
        Parsed::Malformed { raw, reason } => {
            match serde_json::from_str::<Vec<CreativeRecommendation>>(&raw) {
                Ok(recommendations) => Parsed::Valid(CreativeSuggestions { recommendations }),
                Err(_) => Parsed::Malformed { raw, reason },
            }
        }
        valid => valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSIGHT: &str = r#"{
        "hypothesis": "Creative fatigue in Campaign A",
        "evidence": [{"metric": "ctr", "delta": "-32%", "segment": "Campaign A"}],
        "impact": "High",
        "confidence": 0.8,
        "reasoning": "CTR fell while frequency rose"
    }"#;

    #[test]
    fn test_parse_insight_array_and_wrapper() {
        let arr = format!("[{INSIGHT}]");
        let parsed = parse_insights(&arr);
        let insights = parsed.valid().expect("valid array");
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].impact, Impact::High);
        assert!(insights[0].is_statistically_valid());

        let wrapped = format!(r#"{{"insights": [{INSIGHT}]}}"#);
        assert!(parse_insights(&wrapped).valid().is_some());
    }

    #[test]
    fn test_missing_confidence_is_malformed_and_keeps_raw() {
        let raw = r#"[{"hypothesis": "h", "evidence": [], "impact": "Low", "reasoning": "r"}]"#;
        match parse_insights(raw) {
            Parsed::Malformed { raw: kept, reason } => {
                assert_eq!(kept, raw);
                assert!(reason.contains("confidence"));
            }
            Parsed::Valid(_) => panic!("Expected Malformed"),
        }
    }

    #[test]
    fn test_parse_creatives_accepts_bare_array() {
        let raw = r#"[{"campaign_name": "Summer", "current_performance_issue": "Low CTR",
            "suggested_headline": "H", "suggested_message": "M", "reasoning": "R"}]"#;
        let parsed = parse_creatives(raw);
        assert_eq!(parsed.valid().map(|c| c.recommendations.len()), Some(1));
    }

    #[test]
    fn test_evidence_segment_is_optional() {
        let e: Evidence = serde_json::from_str(r#"{"metric": "roas", "delta": "-10%"}"#).unwrap();
        assert!(e.segment.is_none());
        assert_eq!(serde_json::to_string(&e).unwrap(), r#"{"metric":"roas","delta":"-10%"}"#);
    }

    #[test]
    fn test_unavailable_evaluation_does_not_pass() {
        let eval = Evaluation::unavailable("timeout");
        assert!(!eval.passed());
        assert!(eval.verdict.contains("timeout"));
    }
}
