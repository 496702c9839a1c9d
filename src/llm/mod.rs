//! LLM 层：客户端抽象与实现（Groq / OpenAI 兼容 / Mock）

pub mod groq;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use groq::{create_groq_client, GROQ_API_KEY_ENV, GROQ_BASE_URL, GROQ_DEFAULT_MODEL};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{complete_once, LlmClient};
