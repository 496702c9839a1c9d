//! DataAgent：把自然语言数据请求翻译为 TableQuery 并在内存表上执行

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::json::extract_json;
use crate::agents::prompts::render;
use crate::agents::{AgentCapability, AgentKind, AgentOutput, ContextExcerpt};
use crate::core::PipelineError;
use crate::data::{AdsTable, TableQuery};
use crate::llm::{complete_once, LlmClient};
use crate::observability::Telemetry;

pub struct DataAgent {
    llm: Arc<dyn LlmClient>,
    table: Arc<AdsTable>,
    system_prompt: String,
    telemetry: Telemetry,
}

impl DataAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        table: Arc<AdsTable>,
        template: &str,
        telemetry: Telemetry,
    ) -> Self {
        let (date_min, date_max) = table
            .date_range()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .unwrap_or_else(|| ("n/a".to_string(), "n/a".to_string()));
        let system_prompt = render::<TableQuery>(template)
            .replace("{columns}", &table.columns().join(", "))
            .replace("{date_min}", &date_min)
            .replace("{date_max}", &date_max);
        Self {
            llm,
            table,
            system_prompt,
            telemetry,
        }
    }

    pub fn table(&self) -> &AdsTable {
        &self.table
    }
}

#[async_trait]
impl AgentCapability for DataAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::DataAgent
    }

    async fn invoke(
        &self,
        instruction: &str,
        _excerpt: &ContextExcerpt,
    ) -> Result<AgentOutput, PipelineError> {
        tracing::info!(instruction, "Executing data instruction");
        let reply = complete_once(self.llm.as_ref(), &self.system_prompt, instruction).await?;
        let json = extract_json(&reply)
            .ok_or_else(|| PipelineError::unclassified("DataAgent reply contained no JSON query"))?;
        let query: TableQuery = serde_json::from_str(json).map_err(|e| PipelineError::Unclassified {
            message: format!("invalid table query: {e}"),
            source: Some(Box::new(e)),
        })?;
        tracing::debug!(?query, "Generated table query");

        let result = query.execute(&self.table)?;
        let table = result.to_markdown();
        self.telemetry.decision(
            AgentKind::DataAgent.as_str(),
            instruction,
            &table,
            &format!("Executed table query returning {} rows", result.rows.len()),
        );
        Ok(AgentOutput::DataTable(table))
    }
}
