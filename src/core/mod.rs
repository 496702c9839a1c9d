//! 核心层：错误分类、执行守卫、恢复策略、运行上下文、计划执行器

pub mod context;
pub mod error;
pub mod executor;
pub mod guard;
pub mod recovery;
pub mod state;

pub use context::{Context, DataSection, InsightSection, ReviewSection, StepFailure};
pub use error::{BoxError, ErrorKind, PipelineError, RecoveryAction};
pub use executor::{ExecutionReport, ExecutorConfig, PlanStepExecutor, TOP_ADS_UNAVAILABLE};
pub use guard::{ExecutionGuard, ExecutionOutcome, OnFailure, RetryPolicy};
pub use recovery::RecoveryEngine;
pub use state::{StepRecord, StepState, StepStatus};
