//! 智能体层：能力注册表与五个角色（Planner / DataAgent / InsightAgent / CreativeGenerator / Evaluator）

pub mod capability;
pub mod creative;
pub mod data;
pub mod evaluator;
pub mod insight;
pub mod json;
pub mod planner;
pub mod prompts;

pub use capability::{
    AgentCapability, AgentKind, AgentOutput, AgentRegistry, ContextExcerpt, GuardedAgent,
};
pub use creative::CreativeGenerator;
pub use data::DataAgent;
pub use evaluator::{rigor_errors, validate_statistical_rigor, Evaluator};
pub use insight::InsightAgent;
pub use json::extract_json;
pub use planner::{parse_plan, PlannerAgent};
pub use prompts::PromptSet;
