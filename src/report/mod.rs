//! 报告：组装（纯函数）与落盘

pub mod assembler;
pub mod writer;

pub use assembler::{assemble, render_evaluation, ReportArtifacts};
pub use writer::{ArtifactWriter, WrittenArtifacts};
