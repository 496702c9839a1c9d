//! CreativeGenerator：结合洞察与表现最好的广告提出新的创意方向
//!
//! 使用较高采样温度的独立 LLM 客户端（由管线按配置创建）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::json::extract_json;
use crate::agents::prompts::render;
use crate::agents::{AgentCapability, AgentKind, AgentOutput, ContextExcerpt};
use crate::core::PipelineError;
use crate::llm::{complete_once, LlmClient};
use crate::observability::Telemetry;
use crate::schema::{parse_creatives, CreativeSuggestions, Parsed};

pub struct CreativeGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    telemetry: Telemetry,
}

impl CreativeGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, template: &str, telemetry: Telemetry) -> Self {
        Self {
            llm,
            system_prompt: render::<CreativeSuggestions>(template),
            telemetry,
        }
    }
}

#[async_trait]
impl AgentCapability for CreativeGenerator {
    fn kind(&self) -> AgentKind {
        AgentKind::CreativeGenerator
    }

    async fn invoke(
        &self,
        instruction: &str,
        excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        tracing::info!("Generating creative recommendations...");
        let user = format!(
            "Task: {instruction}\n\nInsights:\n{}\n\nTop Performing Ads:\n{}",
            excerpt.insights, excerpt.top_ads
        );
        let reply = complete_once(self.llm.as_ref(), &self.system_prompt, &user).await?;
        let json = extract_json(&reply).ok_or_else(|| {
            PipelineError::unclassified("CreativeGenerator reply contained no JSON recommendations")
        })?;

        let payload = parse_creatives(json);
        let reason = match &payload {
            Parsed::Valid(batch) => format!("Proposed {} creatives", batch.recommendations.len()),
            Parsed::Malformed { reason, .. } => {
                tracing::warn!(%reason, "Creative recommendations do not match the expected schema");
                format!("Creatives kept as raw text: {reason}")
            }
        };
        self.telemetry
            .decision(AgentKind::CreativeGenerator.as_str(), instruction, json, &reason);
        Ok(AgentOutput::Creatives(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompts::CREATIVE_PROMPT;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_creatives_use_insights_and_top_ads() {
        let llm = Arc::new(MockLlmClient::with_replies([r#"{"recommendations": [
            {"campaign_name": "Summer Sale", "current_performance_issue": "CTR down 30%",
             "suggested_headline": "Cool off for less", "suggested_message": "Fresh picks daily",
             "reasoning": "Counters fatigue"}]}"#]));
        let agent = CreativeGenerator::new(llm.clone(), CREATIVE_PROMPT, Telemetry::disabled());
        let excerpt = ContextExcerpt {
            insights: "### Insights (Why):\n[]".into(),
            top_ads: "| ad | roas |".into(),
            ..ContextExcerpt::default()
        };
        let out = agent.invoke("Refresh weak ads", &excerpt).await.unwrap();
        match out {
            AgentOutput::Creatives(Parsed::Valid(batch)) => {
                assert_eq!(batch.recommendations[0].campaign_name, "Summer Sale")
            }
            other => panic!("Expected valid creatives, got {other:?}"),
        }
        let user = &llm.last_request().unwrap()[1].content;
        assert!(user.contains("Insights:\n### Insights (Why):\n[]"));
        assert!(user.ends_with("Top Performing Ads:\n| ad | roas |"));
    }
}
