//! LLM 客户端抽象
//!
//! 所有后端（Groq / OpenAI 兼容 / Mock）实现 LlmClient::complete；错误为传输层原因字符串，
//! 由调用方转成未分类错误交给 ExecutionGuard 重试。

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// system + user 两条消息的单轮调用；传输错误转为 Unclassified
pub async fn complete_once(
    llm: &dyn LlmClient,
    system: &str,
    user: &str,
) -> Result<String, PipelineError> {
    let messages = [Message::system(system), Message::user(user)];
    llm.complete(&messages)
        .await
        .map_err(|e| PipelineError::unclassified(format!("LLM request failed: {e}")))
}
