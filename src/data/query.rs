//! 声明式表查询：过滤、分组聚合、排序、截断，输出 markdown 表格
//!
//! DataAgent 让模型生成 TableQuery JSON 而不是可执行代码；列名不存在等错误属于未分类错误，
//! 交给 ExecutionGuard 重试（模型下一次可能给出正确的列名）。

use std::cmp::Ordering;
use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::data::table::{parse_date, AdRecord, AdsTable, CellValue};

/// 无匹配行时的输出
pub const NO_ROWS: &str = "No rows matched the query.";

/// 分组键为 "all" 时汇总为单行
pub const GROUP_ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Impressions,
    Clicks,
    Spend,
    Roas,
    Ctr,
    Cpm,
    Cpc,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Spend => "spend",
            Self::Roas => "roas",
            Self::Ctr => "ctr",
            Self::Cpm => "cpm",
            Self::Cpc => "cpc",
        }
    }

    fn format(&self, value: f64) -> String {
        match self {
            Self::Impressions | Self::Clicks => format!("{value:.0}"),
            Self::Ctr => format!("{value:.4}"),
            _ => format!("{value:.2}"),
        }
    }

    fn of(&self, r: &AdRecord) -> f64 {
        match self {
            Self::Impressions => r.impressions as f64,
            Self::Clicks => r.clicks as f64,
            Self::Spend => r.spend,
            Self::Roas => r.roas,
            Self::Ctr => r.ctr,
            Self::Cpm => r.cpm,
            Self::Cpc => r.cpc,
        }
    }
}

/// 未指定 metrics 时展示的指标
const DEFAULT_METRICS: [Metric; 5] = [
    Metric::Spend,
    Metric::Impressions,
    Metric::Clicks,
    Metric::Ctr,
    Metric::Roas,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    /// Column to filter on
    pub column: String,
    pub op: FilterOp,
    /// Value to compare against (string or number)
    pub value: serde_json::Value,
}

fn default_descending() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SortBy {
    pub metric: Metric,
    /// Sort descending (default true)
    #[serde(default = "default_descending")]
    pub descending: bool,
}

/// 模型生成的查询
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableQuery {
    /// Row filters, all must match
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Inclusive start date, YYYY-MM-DD
    #[serde(default)]
    pub date_from: Option<String>,
    /// Inclusive end date, YYYY-MM-DD
    #[serde(default)]
    pub date_to: Option<String>,
    /// Column to aggregate by (campaign_name, adset_name, date, creative_type, ...) or "all" for one total row; omit to list individual rows
    #[serde(default)]
    pub group_by: Option<String>,
    /// Metrics to show
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    /// Maximum number of rows in the result
    #[serde(default)]
    pub limit: Option<usize>,
    /// Extra columns to show when listing individual rows (e.g. creative_message)
    #[serde(default)]
    pub columns: Vec<String>,
}

/// 查询结果（表头 + 已格式化的单元格）
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn to_markdown(&self) -> String {
        if self.rows.is_empty() {
            return NO_ROWS.to_string();
        }
        let mut out = String::new();
        out.push_str(&markdown_row(&self.headers));
        out.push('\n');
        out.push_str(&markdown_row(
            &self.headers.iter().map(|_| "---".to_string()).collect::<Vec<_>>(),
        ));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&markdown_row(row));
        }
        out
    }
}

fn markdown_row(cells: &[String]) -> String {
    let escaped: Vec<String> = cells.iter().map(|c| c.replace('|', "\\|")).collect();
    format!("| {} |", escaped.join(" | "))
}

/// 分组内的累计量
#[derive(Debug, Default)]
struct Totals {
    rows: usize,
    impressions: f64,
    clicks: f64,
    spend: f64,
    roas_by_spend: f64,
    roas_sum: f64,
    ctr_by_impressions: f64,
    ctr_sum: f64,
}

impl Totals {
    fn add(&mut self, r: &AdRecord) {
        self.rows += 1;
        self.impressions += r.impressions as f64;
        self.clicks += r.clicks as f64;
        self.spend += r.spend;
        self.roas_by_spend += r.roas * r.spend;
        self.roas_sum += r.roas;
        self.ctr_by_impressions += r.ctr * r.impressions as f64;
        self.ctr_sum += r.ctr;
    }

    /// 计数与花费求和；roas 按花费加权、ctr 按展示加权（权重为 0 时退化为算术平均）；cpm / cpc 由合计重算
    fn metric(&self, m: Metric) -> f64 {
        let mean = |sum: f64| if self.rows > 0 { sum / self.rows as f64 } else { 0.0 };
        match m {
            Metric::Impressions => self.impressions,
            Metric::Clicks => self.clicks,
            Metric::Spend => self.spend,
            Metric::Roas if self.spend > 0.0 => self.roas_by_spend / self.spend,
            Metric::Roas => mean(self.roas_sum),
            Metric::Ctr if self.impressions > 0.0 => self.ctr_by_impressions / self.impressions,
            Metric::Ctr => mean(self.ctr_sum),
            Metric::Cpm if self.impressions > 0.0 => self.spend / self.impressions * 1000.0,
            Metric::Cpc if self.clicks > 0.0 => self.spend / self.clicks,
            Metric::Cpm | Metric::Cpc => 0.0,
        }
    }
}

impl TableQuery {
    pub fn execute(&self, table: &AdsTable) -> Result<QueryResult, PipelineError> {
        self.check_columns(table)?;
        let date_from = self.date_bound(self.date_from.as_deref(), "date_from")?;
        let date_to = self.date_bound(self.date_to.as_deref(), "date_to")?;

        let mut matched = Vec::new();
        for record in table.records() {
            if date_from.is_some_and(|d| record.date < d) || date_to.is_some_and(|d| record.date > d) {
                continue;
            }
            let mut keep = true;
            for filter in &self.filters {
                if !filter_matches(filter, record)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                matched.push(record);
            }
        }

        let metrics: &[Metric] = if self.metrics.is_empty() {
            &DEFAULT_METRICS
        } else {
            &self.metrics
        };

        let result = match self.group_by.as_deref() {
            Some(key) => self.aggregate(key, &matched, metrics),
            None => self.list_rows(&matched, metrics),
        };
        tracing::debug!(
            matched = matched.len(),
            rows = result.rows.len(),
            group_by = ?self.group_by,
            "Table query executed"
        );
        Ok(result)
    }

    fn check_columns(&self, table: &AdsTable) -> Result<(), PipelineError> {
        let unknown = self
            .filters
            .iter()
            .map(|f| f.column.as_str())
            .chain(self.columns.iter().map(String::as_str))
            .chain(self.group_by.as_deref().filter(|g| *g != GROUP_ALL))
            .find(|c| !table.has_column(c));
        match unknown {
            Some(col) => Err(PipelineError::unclassified(format!(
                "unknown column '{col}'; available columns: {}",
                table.columns().join(", ")
            ))),
            None => Ok(()),
        }
    }

    fn date_bound(&self, raw: Option<&str>, field: &str) -> Result<Option<chrono::NaiveDate>, PipelineError> {
        raw.map(|s| {
            parse_date(s).ok_or_else(|| {
                PipelineError::unclassified(format!("{field} '{s}' is not a YYYY-MM-DD date"))
            })
        })
        .transpose()
    }

    fn aggregate(&self, key: &str, matched: &[&AdRecord], metrics: &[Metric]) -> QueryResult {
        let mut groups: BTreeMap<String, Totals> = BTreeMap::new();
        for r in matched {
            let group = if key == GROUP_ALL {
                "All".to_string()
            } else {
                r.value(key).map(|v| display_cell(&v)).unwrap_or_default()
            };
            groups.entry(group).or_default().add(r);
        }

        let mut entries: Vec<(String, Totals)> = groups.into_iter().collect();
        if let Some(sort) = &self.sort_by {
            entries.sort_by(|a, b| {
                compare(a.1.metric(sort.metric), b.1.metric(sort.metric), sort.descending)
            });
        }
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }

        let header = if key == GROUP_ALL { "group" } else { key };
        let mut headers = vec![header.to_string(), "rows".to_string()];
        headers.extend(metrics.iter().map(|m| m.as_str().to_string()));
        let rows = entries
            .iter()
            .map(|(name, totals)| {
                let mut row = vec![name.clone(), totals.rows.to_string()];
                row.extend(metrics.iter().map(|m| m.format(totals.metric(*m))));
                row
            })
            .collect();
        QueryResult { headers, rows }
    }

    fn list_rows(&self, matched: &[&AdRecord], metrics: &[Metric]) -> QueryResult {
        let mut rows: Vec<&AdRecord> = matched.to_vec();
        if let Some(sort) = &self.sort_by {
            rows.sort_by(|a, b| compare(sort.metric.of(a), sort.metric.of(b), sort.descending));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        let mut headers: Vec<String> = ["date", "campaign_name", "adset_name"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        headers.extend(self.columns.iter().cloned());
        headers.extend(metrics.iter().map(|m| m.as_str().to_string()));

        let rows = rows
            .iter()
            .map(|r| {
                let mut row = vec![
                    r.date.format("%Y-%m-%d").to_string(),
                    r.campaign_name.clone(),
                    r.adset_name.clone(),
                ];
                row.extend(
                    self.columns
                        .iter()
                        .map(|c| r.value(c).map(|v| display_cell(&v)).unwrap_or_default()),
                );
                row.extend(metrics.iter().map(|m| m.format(m.of(r))));
                row
            })
            .collect();
        QueryResult { headers, rows }
    }
}

fn compare(a: f64, b: f64, descending: bool) -> Ordering {
    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

fn display_cell(v: &CellValue<'_>) -> String {
    match v {
        CellValue::Text(s) => s.to_string(),
        CellValue::Number(n) if n.fract() == 0.0 => format!("{n:.0}"),
        CellValue::Number(n) => format!("{n}"),
        CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
    }
}

fn json_as_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_as_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_matches(filter: &Filter, record: &AdRecord) -> Result<bool, PipelineError> {
    let cell = record
        .value(&filter.column)
        .ok_or_else(|| PipelineError::unclassified(format!("unknown column '{}'", filter.column)))?;

    let ordering = match (&cell, filter.op) {
        (_, FilterOp::Contains) => {
            let needle = json_as_text(&filter.value).to_lowercase();
            return Ok(display_cell(&cell).to_lowercase().contains(&needle));
        }
        (CellValue::Number(n), _) => {
            let target = json_as_number(&filter.value).ok_or_else(|| {
                PipelineError::unclassified(format!(
                    "filter on '{}' needs a numeric value, got {}",
                    filter.column, filter.value
                ))
            })?;
            n.partial_cmp(&target).unwrap_or(Ordering::Equal)
        }
        (CellValue::Date(d), _) => {
            let raw = json_as_text(&filter.value);
            let target = parse_date(&raw).ok_or_else(|| {
                PipelineError::unclassified(format!("filter on 'date' needs YYYY-MM-DD, got '{raw}'"))
            })?;
            d.cmp(&target)
        }
        (CellValue::Text(s), FilterOp::Eq | FilterOp::Ne) => {
            let equal = s.eq_ignore_ascii_case(&json_as_text(&filter.value));
            return Ok(equal == (filter.op == FilterOp::Eq));
        }
        (CellValue::Text(s), _) => s.cmp(&json_as_text(&filter.value).as_str()),
    };

    Ok(match filter.op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Ne => ordering != Ordering::Equal,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Gte => ordering != Ordering::Less,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Lte => ordering != Ordering::Greater,
        FilterOp::Contains => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;

    fn table() -> AdsTable {
        let csv = "date,campaign_name,adset_name,impressions,clicks,spend,roas,ctr,creative_type,creative_message\n\
            2025-01-01,Summer Sale,Broad,1000,20,100,4.0,0.02,Video,Beat the heat\n\
            2025-01-02,Summer Sale,Lookalike,3000,30,300,2.0,0.01,Image,Cool deals\n\
            2025-01-01,Winter Promo,Broad,2000,100,100,1.0,0.05,Image,Stay warm\n\
            2025-01-03,Winter Promo,Retarget,0,0,0,0.5,0,Video,Come back\n";
        AdsTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn query(json: &str) -> TableQuery {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_group_by_campaign_uses_weighted_averages() {
        let q = query(r#"{"group_by": "campaign_name", "metrics": ["spend", "roas", "ctr", "cpm", "cpc"]}"#);
        let result = q.execute(&table()).unwrap();
        assert_eq!(result.headers, vec!["campaign_name", "rows", "spend", "roas", "ctr", "cpm", "cpc"]);
        // Summer: roas = (4*100 + 2*300) / 400 = 2.5; ctr = (0.02*1000 + 0.01*3000) / 4000 = 0.0125
        assert_eq!(
            result.rows[0],
            vec!["Summer Sale", "2", "400.00", "2.50", "0.0125", "100.00", "8.00"]
        );
        // Winter: 零展示行不影响加权 ctr
        assert_eq!(result.rows[1][0], "Winter Promo");
        assert_eq!(result.rows[1][4], "0.0500");
    }

    #[test]
    fn test_row_mode_sort_and_limit_for_top_ads() {
        let q = query(
            r#"{"metrics": ["roas"], "sort_by": {"metric": "roas"}, "limit": 2, "columns": ["creative_message"]}"#,
        );
        let result = q.execute(&table()).unwrap();
        assert_eq!(
            result.headers,
            vec!["date", "campaign_name", "adset_name", "creative_message", "roas"]
        );
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][3], "Beat the heat");
        assert_eq!(result.rows[1][3], "Cool deals");
        let md = result.to_markdown();
        assert!(md.starts_with("| date | campaign_name |"));
        assert!(md.contains("| --- |"));
    }

    #[test]
    fn test_filters_and_date_range() {
        let q = query(
            r#"{"filters": [{"column": "creative_type", "op": "eq", "value": "image"},
                            {"column": "spend", "op": "gte", "value": 150}],
                "date_from": "2025-01-02"}"#,
        );
        let result = q.execute(&table()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][2], "Lookalike");

        let q = query(r#"{"filters": [{"column": "campaign_name", "op": "contains", "value": "winter"}]}"#);
        assert_eq!(q.execute(&table()).unwrap().rows.len(), 2);
    }

    #[test]
    fn test_group_all_and_empty_result() {
        let q = query(r#"{"group_by": "all", "metrics": ["impressions", "clicks"]}"#);
        let result = q.execute(&table()).unwrap();
        assert_eq!(result.rows, vec![vec!["All", "4", "6000", "150"]]);

        let q = query(r#"{"filters": [{"column": "roas", "op": "gt", "value": 100}]}"#);
        assert_eq!(q.execute(&table()).unwrap().to_markdown(), NO_ROWS);
    }

    #[test]
    fn test_unknown_column_is_unclassified() {
        let q = query(r#"{"group_by": "country"}"#);
        let err = q.execute(&table()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert!(err.to_string().contains("country"));

        let q = query(r#"{"filters": [{"column": "spend", "op": "gt", "value": "lots"}]}"#);
        assert_eq!(q.execute(&table()).unwrap_err().kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let result = QueryResult {
            headers: vec!["creative_message".into()],
            rows: vec![vec!["A | B".into()]],
        };
        assert_eq!(result.to_markdown(), "| creative_message |\n| --- |\n| A \\| B |");
    }
}
