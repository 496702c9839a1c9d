//! Evaluator：统计严谨性检查 + LLM 评审
//!
//! 严谨性检查是确定性的，直接作用于洞察的 JSON 原文（包括未通过 schema 的片段）；
//! LLM 评审在有最终报告时评审报告，否则评审目前为止的洞察。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::json::extract_json;
use crate::agents::prompts::render;
use crate::agents::{AgentCapability, AgentKind, AgentOutput, ContextExcerpt};
use crate::core::PipelineError;
use crate::llm::{complete_once, LlmClient};
use crate::observability::Telemetry;
use crate::schema::{Evaluation, ReviewVerdict};

/// 洞察片段不是数组时的错误
pub const NOT_AN_ARRAY: &str = "Insights payload is not a JSON array";

/// 取出洞察记录；兼容 `{"insights": [...]}` 包装
fn insight_records(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("insights").and_then(Value::as_array),
        _ => None,
    }
}

fn check_record(index: usize, record: &Value, errors: &mut Vec<String>) {
    let confidence_ok = record
        .get("confidence")
        .and_then(Value::as_f64)
        .is_some_and(|c| (0.0..=1.0).contains(&c));
    if !confidence_ok {
        errors.push(format!("Insight {index}: Missing or invalid confidence score"));
    }
    let has_evidence = record
        .get("evidence")
        .and_then(Value::as_array)
        .is_some_and(|e| !e.is_empty());
    if !has_evidence {
        errors.push(format!("Insight {index}: No evidence provided"));
    }
}

/// 检查一段洞察 JSON；每条记录编号从 1 开始
pub fn validate_statistical_rigor(json: &str) -> Vec<String> {
    rigor_errors([json])
}

/// 跨多个片段连续编号的严谨性检查
pub fn rigor_errors<'a, I>(fragments: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut errors = Vec::new();
    let mut index = 0;
    for fragment in fragments {
        let parsed: Option<Value> = serde_json::from_str(fragment).ok();
        match parsed.as_ref().and_then(insight_records) {
            Some(records) => {
                for record in records {
                    index += 1;
                    check_record(index, record, &mut errors);
                }
            }
            None => errors.push(NOT_AN_ARRAY.to_string()),
        }
    }
    errors
}

pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    telemetry: Telemetry,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmClient>, template: &str, telemetry: Telemetry) -> Self {
        Self {
            llm,
            system_prompt: render::<ReviewVerdict>(template),
            telemetry,
        }
    }

    /// 严谨性检查 + LLM 评审
    pub async fn review(&self, excerpt: &ContextExcerpt) -> Result<Evaluation, PipelineError> {
        let rigor = rigor_errors(excerpt.insight_fragments.iter().map(String::as_str));
        for e in &rigor {
            tracing::warn!(error = %e, "Statistical rigor check failed");
        }

        let material = match &excerpt.report {
            Some(report) => format!("Report:\n{report}"),
            None => format!("Insights:\n{}", excerpt.insights),
        };
        let user = format!("Question: {}\n\n{material}", excerpt.query);
        let reply = complete_once(self.llm.as_ref(), &self.system_prompt, &user).await?;
        let json = extract_json(&reply)
            .ok_or_else(|| PipelineError::unclassified("Evaluator reply contained no JSON verdict"))?;
        let verdict: ReviewVerdict = serde_json::from_str(json)?;

        let evaluation = Evaluation::from_verdict(verdict, rigor);
        self.telemetry.decision(
            AgentKind::Evaluator.as_str(),
            &material,
            &evaluation.verdict,
            &format!(
                "Scored {:.1}/10 with {} issues and {} rigor errors",
                evaluation.score.unwrap_or_default(),
                evaluation.issues.len(),
                evaluation.rigor_errors.len()
            ),
        );
        Ok(evaluation)
    }
}

#[async_trait]
impl AgentCapability for Evaluator {
    fn kind(&self) -> AgentKind {
        AgentKind::Evaluator
    }

    async fn invoke(
        &self,
        instruction: &str,
        excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        tracing::info!(instruction, "Evaluating insights");
        Ok(AgentOutput::Review(self.review(excerpt).await?))
    }
}
