//! adscope - 广告投放数据多智能体分析管线
//!
//! 模块划分：
//! - **agents**: 能力注册表与五个角色（Planner / DataAgent / InsightAgent / CreativeGenerator / Evaluator）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、执行守卫、恢复策略、运行上下文、计划执行器
//! - **data**: 投放数据 CSV 读取、校验与声明式查询
//! - **llm**: LLM 客户端抽象与实现（Groq / OpenAI 兼容 / Mock）
//! - **observability**: 控制台与 JSON 行日志、决策记录
//! - **pipeline**: 规划 -> 执行 -> 报告 -> 评审 -> 落盘
//! - **report**: 报告组装与产物写入
//! - **schema**: 计划、洞察、创意建议、评估结果的数据模型

pub mod agents;
pub mod config;
pub mod core;
pub mod data;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod schema;

pub use pipeline::{AnalysisPipeline, PipelineParts, PipelineSettings, RunSummary};
