//! 产物落盘：report.md、insights.json、可选 creatives.json、evaluation.json

use std::path::PathBuf;

use crate::core::PipelineError;
use crate::report::ReportArtifacts;
use crate::schema::Evaluation;

pub const REPORT_FILE: &str = "report.md";
pub const INSIGHTS_FILE: &str = "insights.json";
pub const CREATIVES_FILE: &str = "creatives.json";
pub const EVALUATION_FILE: &str = "evaluation.json";

/// 已写入的文件路径
#[derive(Debug, Clone)]
pub struct WrittenArtifacts {
    pub report: PathBuf,
    pub insights: PathBuf,
    pub creatives: Option<PathBuf>,
    pub evaluation: PathBuf,
}

pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// 写入全部产物；上一次运行遗留的 creatives.json 在本次没有创意建议时删除
    pub fn write(
        &self,
        artifacts: &ReportArtifacts,
        evaluation: &Evaluation,
    ) -> Result<WrittenArtifacts, PipelineError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let report = self.output_dir.join(REPORT_FILE);
        std::fs::write(&report, &artifacts.markdown)?;

        let insights = self.output_dir.join(INSIGHTS_FILE);
        std::fs::write(&insights, &artifacts.insights_json)?;

        let creatives_path = self.output_dir.join(CREATIVES_FILE);
        let creatives = match &artifacts.creatives_json {
            Some(json) => {
                std::fs::write(&creatives_path, json)?;
                Some(creatives_path)
            }
            None => {
                if creatives_path.exists() {
                    std::fs::remove_file(&creatives_path)?;
                }
                None
            }
        };

        let evaluation_path = self.output_dir.join(EVALUATION_FILE);
        std::fs::write(&evaluation_path, serde_json::to_string_pretty(evaluation)?)?;

        tracing::info!(dir = %self.output_dir.display(), "Artifacts written");
        Ok(WrittenArtifacts {
            report,
            insights,
            creatives,
            evaluation: evaluation_path,
        })
    }
}
