//! 投放数据 schema：必需列与校验错误汇总
//!
//! 先检查表头（缺列立即失败，不读任何行），再由 table 逐行解析并收集 RowIssue，
//! 最后汇总为一个 Validation 错误。

use std::fmt;

use crate::core::PipelineError;

/// CSV 必须包含的列
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "date",
    "campaign_name",
    "adset_name",
    "impressions",
    "clicks",
    "spend",
    "roas",
    "ctr",
];

/// 可由 CSV 提供、缺失时自动计算的派生列
pub const DERIVED_COLUMNS: [&str; 2] = ["cpm", "cpc"];

/// 错误消息中最多逐条列出的行问题数
pub const MAX_LISTED_ISSUES: usize = 10;

/// 表头校验：列出全部缺失的必需列
pub fn validate_headers<S: AsRef<str>>(headers: &[S]) -> Result<(), PipelineError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h.as_ref() == *col))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::validation(format!(
            "Missing columns: {}",
            missing.join(", ")
        )))
    }
}

/// 单元格级问题；row 为 CSV 中的数据行号（表头之后从 1 开始）
#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}, column '{}': '{}' is not {}",
            self.row, self.column, self.value, self.expected
        )
    }
}

/// 汇总行问题；无问题时返回 None
pub fn issues_to_error(issues: &[RowIssue]) -> Option<PipelineError> {
    if issues.is_empty() {
        return None;
    }
    let mut lines: Vec<String> = issues
        .iter()
        .take(MAX_LISTED_ISSUES)
        .map(|i| format!("  - {i}"))
        .collect();
    if issues.len() > MAX_LISTED_ISSUES {
        lines.push(format!("  ... and {} more", issues.len() - MAX_LISTED_ISSUES));
    }
    Some(PipelineError::validation(format!(
        "{} invalid value(s) in ads data:\n{}",
        issues.len(),
        lines.join("\n")
    )))
}
