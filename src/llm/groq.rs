//! Groq API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.groq.com/openai/v1
//! - 默认模型: llama-3.3-70b-versatile，可通过配置 `llm.model`（或 `ADSCOPE__LLM__MODEL`）覆盖

use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 凭据环境变量
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

/// 创建 Groq 客户端
///
/// - `base_url` 为 None 时使用 Groq 官方端点
/// - `model` 为 None 时使用默认模型
pub fn create_groq_client(
    api_key: &str,
    model: Option<&str>,
    base_url: Option<&str>,
    temperature: f32,
) -> OpenAiClient {
    OpenAiClient::new(
        Some(base_url.unwrap_or(GROQ_BASE_URL)),
        model.unwrap_or(GROQ_DEFAULT_MODEL),
        Some(api_key),
    )
    .with_temperature(temperature)
}
