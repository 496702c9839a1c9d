//! 报告组装：Context -> markdown 报告 + insights.json + creatives.json
//!
//! 纯函数，不调用 LLM，不读时间；同一 Context 重复组装得到逐字节相同的输出。
//! 缺失或失败的部分渲染为占位说明，无法解析的片段附原文。

use std::fmt::Write;

use crate::agents::AgentKind;
use crate::core::{Context, StepFailure};
use crate::schema::{CreativeRecommendation, Evaluation, Insight, Parsed};

pub const REPORT_TITLE: &str = "# Ad Performance Analysis Report";
pub const NO_DATA_PLACEHOLDER: &str = "_No data was collected for this run._";
pub const NO_INSIGHTS_PLACEHOLDER: &str = "_No insights were generated for this run._";
pub const NO_CREATIVES_PLACEHOLDER: &str = "_No creative recommendations were generated for this run._";

/// 一次组装的全部产物
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifacts {
    pub markdown: String,
    /// 所有符合 schema 的洞察组成的 JSON 数组
    pub insights_json: String,
    /// 仅在创意建议存在且符合 schema 时生成
    pub creatives_json: Option<String>,
}

pub fn assemble(context: &Context) -> ReportArtifacts {
    let mut md = String::new();
    let _ = writeln!(md, "{REPORT_TITLE}\n");
    let _ = writeln!(md, "## Query\n{}\n", context.query);

    render_data(&mut md, context);
    render_insights(&mut md, context);
    render_creatives(&mut md, context);
    render_reviews(&mut md, context);
    render_omitted(&mut md, &context.failures);

    let insights: Vec<&Insight> = context.all_insights();
    let insights_json = serde_json::to_string_pretty(&insights).unwrap_or_else(|_| "[]".to_string());
    let creatives_json = context
        .creatives()
        .and_then(Parsed::valid)
        .and_then(|batch| serde_json::to_string_pretty(batch).ok());

    ReportArtifacts {
        markdown: md.trim_end().to_string() + "\n",
        insights_json,
        creatives_json,
    }
}

fn failures_of(context: &Context, kind: AgentKind) -> impl Iterator<Item = &StepFailure> {
    context.failures.iter().filter(move |f| f.agent == kind)
}

fn omitted_line(failure: &StepFailure) -> String {
    format!(
        "_Step '{}' failed and its output was omitted: {}_",
        failure.step_name, failure.reason
    )
}

fn malformed_block(what: &str, raw: &str, reason: &str) -> String {
    format!("_The {what} from this step could not be parsed ({reason}). Raw output:_\n\n```json\n{raw}\n```")
}

fn render_data(md: &mut String, context: &Context) {
    let _ = writeln!(md, "## Data Analysis");
    let mut empty = true;
    for section in &context.data_summary {
        empty = false;
        let _ = writeln!(md, "### Data Output ({}):\n{}\n", section.step_name, section.content);
    }
    for failure in failures_of(context, AgentKind::DataAgent) {
        empty = false;
        let _ = writeln!(md, "{}\n", omitted_line(failure));
    }
    if empty {
        let _ = writeln!(md, "{NO_DATA_PLACEHOLDER}\n");
    }
}

fn render_insight(md: &mut String, n: usize, insight: &Insight) {
    let _ = writeln!(md, "#### {n}. {}", insight.hypothesis);
    let _ = writeln!(md, "- **Impact**: {}", insight.impact);
    let _ = writeln!(md, "- **Confidence**: {:.2}", insight.confidence);
    let _ = writeln!(md, "- **Evidence**:");
    if insight.evidence.is_empty() {
        let _ = writeln!(md, "  - _none provided_");
    }
    for e in &insight.evidence {
        match &e.segment {
            Some(segment) => {
                let _ = writeln!(md, "  - {}: {} ({segment})", e.metric, e.delta);
            }
            None => {
                let _ = writeln!(md, "  - {}: {}", e.metric, e.delta);
            }
        }
    }
    let _ = writeln!(md, "- **Reasoning**: {}\n", insight.reasoning);
}

fn render_insights(md: &mut String, context: &Context) {
    let _ = writeln!(md, "## Insights");
    let mut empty = true;
    let mut n = 0;
    for section in &context.insights {
        empty = false;
        let _ = writeln!(md, "### Insights ({})", section.step_name);
        match &section.payload {
            Parsed::Valid(insights) if insights.is_empty() => {
                let _ = writeln!(md, "_This step produced no insights._\n");
            }
            Parsed::Valid(insights) => {
                for insight in insights {
                    n += 1;
                    render_insight(md, n, insight);
                }
            }
            Parsed::Malformed { raw, reason } => {
                let _ = writeln!(md, "{}\n", malformed_block("insights", raw, reason));
            }
        }
    }
    for failure in failures_of(context, AgentKind::InsightAgent) {
        empty = false;
        let _ = writeln!(md, "{}\n", omitted_line(failure));
    }
    if empty {
        let _ = writeln!(md, "{NO_INSIGHTS_PLACEHOLDER}\n");
    }
}

fn render_recommendation(md: &mut String, rec: &CreativeRecommendation) {
    let _ = writeln!(md, "### Campaign: {}", rec.campaign_name);
    let _ = writeln!(md, "- **Issue**: {}", rec.current_performance_issue);
    let _ = writeln!(md, "- **New Headline**: {}", rec.suggested_headline);
    let _ = writeln!(md, "- **New Message**: {}", rec.suggested_message);
    let _ = writeln!(md, "- **Reasoning**: {}\n", rec.reasoning);
}

fn render_creatives(md: &mut String, context: &Context) {
    let _ = writeln!(md, "## Creative Recommendations");
    let mut empty = true;
    match context.creatives() {
        Some(Parsed::Valid(batch)) if !batch.recommendations.is_empty() => {
            empty = false;
            for rec in &batch.recommendations {
                render_recommendation(md, rec);
            }
        }
        Some(Parsed::Malformed { raw, reason }) => {
            empty = false;
            let _ = writeln!(md, "{}\n", malformed_block("creative recommendations", raw, reason));
        }
        _ => {}
    }
    for failure in failures_of(context, AgentKind::CreativeGenerator) {
        empty = false;
        let _ = writeln!(md, "{}\n", omitted_line(failure));
    }
    if empty {
        let _ = writeln!(md, "{NO_CREATIVES_PLACEHOLDER}\n");
    }
}

/// 评估结果的 markdown 片段（计划内的 Evaluator 步骤与最终评审共用）
pub fn render_evaluation(md: &mut String, evaluation: &Evaluation) {
    match evaluation.score {
        Some(score) => {
            let _ = writeln!(md, "- **Score**: {score:.1}/10");
        }
        None => {
            let _ = writeln!(md, "- **Score**: n/a");
        }
    }
    let _ = writeln!(md, "- **Verdict**: {}", evaluation.verdict);
    if !evaluation.issues.is_empty() {
        let _ = writeln!(md, "- **Issues**:");
        for issue in &evaluation.issues {
            let _ = writeln!(md, "  - {issue}");
        }
    }
    if evaluation.rigor_errors.is_empty() {
        let _ = writeln!(md, "- **Statistical rigor**: passed");
    } else {
        let _ = writeln!(md, "- **Statistical rigor**:");
        for e in &evaluation.rigor_errors {
            let _ = writeln!(md, "  - {e}");
        }
    }
    md.push('\n');
}

fn render_reviews(md: &mut String, context: &Context) {
    let failed: Vec<&StepFailure> = failures_of(context, AgentKind::Evaluator).collect();
    if context.reviews.is_empty() && failed.is_empty() {
        return;
    }
    let _ = writeln!(md, "## Reviews");
    for review in &context.reviews {
        let _ = writeln!(md, "### Review ({})", review.step_name);
        render_evaluation(md, &review.evaluation);
    }
    for failure in failed {
        let _ = writeln!(md, "{}\n", omitted_line(failure));
    }
}

fn render_omitted(md: &mut String, failures: &[StepFailure]) {
    if failures.is_empty() {
        return;
    }
    let _ = writeln!(md, "## Omitted Steps");
    for f in failures {
        let _ = writeln!(md, "- **{}** ({}): {}", f.step_name, f.agent, f.reason);
    }
    md.push('\n');
}
