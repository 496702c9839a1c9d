//! InsightAgent：根据已收集的数据输出结构化假设

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::json::extract_json;
use crate::agents::prompts::render;
use crate::agents::{AgentCapability, AgentKind, AgentOutput, ContextExcerpt};
use crate::core::PipelineError;
use crate::llm::{complete_once, LlmClient};
use crate::observability::Telemetry;
use crate::schema::{parse_insights, Insight, Parsed};

/// 尚无数据输出时交给模型的占位
const NO_DATA: &str = "(no data has been collected yet)";

pub struct InsightAgent {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    telemetry: Telemetry,
}

impl InsightAgent {
    pub fn new(llm: Arc<dyn LlmClient>, template: &str, telemetry: Telemetry) -> Self {
        Self {
            llm,
            system_prompt: render::<Vec<Insight>>(template),
            telemetry,
        }
    }
}

#[async_trait]
impl AgentCapability for InsightAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::InsightAgent
    }

    async fn invoke(
        &self,
        instruction: &str,
        excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        tracing::info!(context = %instruction, "Analyzing data");
        let data_summary = if excerpt.data_summary.trim().is_empty() {
            NO_DATA
        } else {
            excerpt.data_summary.as_str()
        };
        let user = format!("Context: {instruction}\n\nData Summary:\n{data_summary}");
        let reply = complete_once(self.llm.as_ref(), &self.system_prompt, &user).await?;

        let json = extract_json(&reply)
            .ok_or_else(|| PipelineError::unclassified("InsightAgent reply contained no JSON insights"))?;
        let payload = parse_insights(json);
        let reason = match &payload {
            Parsed::Valid(insights) => format!("Generated {} structured insights", insights.len()),
            Parsed::Malformed { reason, .. } => {
                tracing::warn!(%reason, "Insights do not match the expected schema, keeping raw output");
                format!("Insights kept as raw text: {reason}")
            }
        };
        self.telemetry
            .decision(AgentKind::InsightAgent.as_str(), instruction, json, &reason);
        Ok(AgentOutput::Insights(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::INSIGHT_PROMPT;
    use crate::core::ErrorKind;
    use crate::llm::MockLlmClient;

    const REPLY: &str = r#"Here you go:
[{"hypothesis": "Creative fatigue", "evidence": [{"metric": "ctr", "delta": "-32%"}],
  "impact": "High", "confidence": 0.7, "reasoning": "CTR decayed steadily"}]"#;

    #[tokio::test]
    async fn test_insights_receive_data_summary() {
        let llm = Arc::new(MockLlmClient::with_replies([REPLY]));
        let agent = InsightAgent::new(llm.clone(), INSIGHT_PROMPT, Telemetry::disabled());
        let excerpt = ContextExcerpt {
            data_summary: "### Data Output (Load):\n| a |".into(),
            ..ContextExcerpt::default()
        };
        let out = agent.invoke("Find why ROAS fell", &excerpt).await.unwrap();
        match out {
            AgentOutput::Insights(Parsed::Valid(insights)) => {
                assert_eq!(insights[0].hypothesis, "Creative fatigue")
            }
            other => panic!("Expected valid insights, got {other:?}"),
        }
        let user = &llm.last_request().unwrap()[1].content;
        assert_eq!(
            user,
            "Context: Find why ROAS fell\n\nData Summary:\n### Data Output (Load):\n| a |"
        );
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_kept_as_malformed() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"[{"hypothesis": "x", "impact": "Severe"}]"#,
        ]));
        let agent = InsightAgent::new(llm.clone(), INSIGHT_PROMPT, Telemetry::disabled());
        let out = agent.invoke("c", &ContextExcerpt::default()).await.unwrap();
        assert!(matches!(out, AgentOutput::Insights(Parsed::Malformed { .. })));
        assert!(llm.last_request().unwrap()[1].content.contains(NO_DATA));
    }

    #[tokio::test]
    async fn test_reply_without_json_fails() {
        let llm = Arc::new(MockLlmClient::with_replies(["The data looks fine."]));
        let agent = InsightAgent::new(llm, INSIGHT_PROMPT, Telemetry::disabled());
        let err = agent.invoke("c", &ContextExcerpt::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unclassified);
    }
}
