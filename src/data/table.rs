//! 投放数据表：CSV 读取、逐行类型校验、派生指标
//!
//! 文件无法打开或不是合法 CSV 视为输入数据错误（Validation），不会被重试。

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::PipelineError;
use crate::data::schema::{issues_to_error, validate_headers, RowIssue, DERIVED_COLUMNS, REQUIRED_COLUMNS};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// 单日单广告组的投放记录
#[derive(Debug, Clone, PartialEq)]
pub struct AdRecord {
    pub date: NaiveDate,
    pub campaign_name: String,
    pub adset_name: String,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub roas: f64,
    pub ctr: f64,
    pub cpm: f64,
    pub cpc: f64,
    /// 必需列以外的列（如 creative_message、creative_type），原样保留
    pub extra: BTreeMap<String, String>,
}

/// 单元格取值，用于查询过滤与展示
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue<'a> {
    Text(&'a str),
    Number(f64),
    Date(NaiveDate),
}

impl AdRecord {
    /// 按列名取值；未知列返回 None
    pub fn value(&self, column: &str) -> Option<CellValue<'_>> {
        let v = match column {
            "date" => CellValue::Date(self.date),
            "campaign_name" => CellValue::Text(&self.campaign_name),
            "adset_name" => CellValue::Text(&self.adset_name),
            "impressions" => CellValue::Number(self.impressions as f64),
            "clicks" => CellValue::Number(self.clicks as f64),
            "spend" => CellValue::Number(self.spend),
            "roas" => CellValue::Number(self.roas),
            "ctr" => CellValue::Number(self.ctr),
            "cpm" => CellValue::Number(self.cpm),
            "cpc" => CellValue::Number(self.cpc),
            other => CellValue::Text(self.extra.get(other)?),
        };
        Some(v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdsTable {
    records: Vec<AdRecord>,
    extra_columns: Vec<String>,
}

impl AdsTable {
    /// 从文件读取
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::Validation {
            message: format!("cannot open ads data {}: {e}", path.display()),
            source: Some(Box::new(e)),
        })?;
        let table = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = table.len(),
            "Loaded ads data"
        );
        Ok(table)
    }

    /// 从任意 reader 读取（首行为表头）
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        validate_headers(&headers)?;

        let extra_columns: Vec<String> = headers
            .iter()
            .filter(|h| !REQUIRED_COLUMNS.contains(&h.as_str()) && !DERIVED_COLUMNS.contains(&h.as_str()))
            .cloned()
            .collect();

        let mut records = Vec::new();
        let mut issues = Vec::new();
        for (i, row) in rdr.records().enumerate() {
            let row = row.map_err(csv_error)?;
            let cells: BTreeMap<&str, &str> = headers
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect();
            if let Some(record) = parse_row(i + 1, &cells, &extra_columns, &mut issues) {
                records.push(record);
            }
        }

        if let Some(err) = issues_to_error(&issues) {
            return Err(err);
        }
        Ok(Self {
            records,
            extra_columns,
        })
    }

    pub fn records(&self) -> &[AdRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// 全部可查询列：必需列、派生列、额外列
    pub fn columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .chain(DERIVED_COLUMNS.iter())
            .map(|s| s.to_string())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        REQUIRED_COLUMNS.contains(&column)
            || DERIVED_COLUMNS.contains(&column)
            || self.extra_columns.iter().any(|c| c == column)
    }

    /// 数据覆盖的日期范围
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }
}

fn csv_error(e: csv::Error) -> PipelineError {
    PipelineError::Validation {
        message: format!("ads data is not valid CSV: {e}"),
        source: Some(Box::new(e)),
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|dt| dt.date())
}

fn parse_count(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().or_else(|| {
        // 部分导出工具把整数写成 "1200.0"
        raw.parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0 && v.is_finite())
            .map(|v| v as u64)
    })
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| *v >= 0.0 && v.is_finite())
}

fn ratio(numerator: f64, denominator: f64, scale: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * scale
    } else {
        0.0
    }
}

/// 解析一行；有问题时记入 issues 并返回 None
fn parse_row(
    row: usize,
    cells: &BTreeMap<&str, &str>,
    extra_columns: &[String],
    issues: &mut Vec<RowIssue>,
) -> Option<AdRecord> {
    let before = issues.len();
    let cell = |column: &str| cells.get(column).copied().unwrap_or("");

    let mut check = |column: &'static str, expected: &'static str, ok: bool| {
        if !ok {
            issues.push(RowIssue {
                row,
                column: column.to_string(),
                value: cell(column).to_string(),
                expected,
            });
        }
    };

    let date = parse_date(cell("date"));
    check("date", "a date (YYYY-MM-DD)", date.is_some());
    let impressions = parse_count(cell("impressions"));
    check("impressions", "a non-negative integer", impressions.is_some());
    let clicks = parse_count(cell("clicks"));
    check("clicks", "a non-negative integer", clicks.is_some());
    let spend = parse_amount(cell("spend"));
    check("spend", "a non-negative number", spend.is_some());
    let roas = parse_amount(cell("roas"));
    check("roas", "a non-negative number", roas.is_some());
    let ctr = parse_amount(cell("ctr"));
    check("ctr", "a non-negative number", ctr.is_some());

    // CSV 自带派生列时使用其值，空单元格按缺失处理
    let provided = |column: &'static str| cells.get(column).filter(|v| !v.is_empty()).copied();
    let cpm = provided("cpm").map(parse_amount);
    if let Some(None) = cpm {
        check("cpm", "a non-negative number", false);
    }
    let cpc = provided("cpc").map(parse_amount);
    if let Some(None) = cpc {
        check("cpc", "a non-negative number", false);
    }

    if issues.len() > before {
        return None;
    }

    let (impressions, clicks, spend) = (impressions?, clicks?, spend?);
    Some(AdRecord {
        date: date?,
        campaign_name: cell("campaign_name").to_string(),
        adset_name: cell("adset_name").to_string(),
        impressions,
        clicks,
        spend,
        roas: roas?,
        ctr: ctr?,
        cpm: cpm.flatten().unwrap_or_else(|| ratio(spend, impressions as f64, 1000.0)),
        cpc: cpc.flatten().unwrap_or_else(|| ratio(spend, clicks as f64, 1.0)),
        extra: extra_columns
            .iter()
            .map(|c| (c.clone(), cell(c).to_string()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::io::Write;

    const HEADER: &str = "date,campaign_name,adset_name,impressions,clicks,spend,roas,ctr";

    #[test]
    fn test_load_derives_cpm_and_cpc() {
        let csv = format!(
            "{HEADER},creative_message\n\
             2025-01-01,Summer Sale,Broad,1000,50,25.0,3.2,0.05,Sun is out\n\
             2025-01-02,Summer Sale,Broad,0,0,0,0,0,Quiet day\n"
        );
        let table = AdsTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.records()[0];
        assert!((first.cpm - 25.0).abs() < 1e-9);
        assert!((first.cpc - 0.5).abs() < 1e-9);
        assert_eq!(first.extra.get("creative_message").map(String::as_str), Some("Sun is out"));
        let empty = &table.records()[1];
        assert_eq!(empty.cpm, 0.0);
        assert_eq!(empty.cpc, 0.0);
        assert_eq!(table.extra_columns(), ["creative_message".to_string()]);
        assert!(table.has_column("cpm"));
    }

    #[test]
    fn test_provided_derived_columns_are_kept() {
        let csv = format!("{HEADER},cpm,cpc\n2025-01-01,A,B,1000,50,25.0,3.2,0.05,99.5,1.5\n");
        let table = AdsTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.records()[0].cpm, 99.5);
        assert_eq!(table.records()[0].cpc, 1.5);
        assert!(table.extra_columns().is_empty());
    }

    #[test]
    fn test_missing_column_fails_before_rows() {
        // 行数据同样无效，但只报告缺列
        let csv = "date,campaign_name,impressions,clicks,spend,roas,ctr\nnot-a-date,A,x,y,z,1,1\n";
        let err = AdsTable::from_reader(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains("adset_name"));
        assert!(!msg.contains("row"));
    }

    #[test]
    fn test_row_type_errors_name_the_offending_rows() {
        let csv = format!(
            "{HEADER}\n\
             2025-01-01,A,B,1000,50,25.0,3.2,0.05\n\
             2025-01-02,A,B,lots,50,25.0,3.2,0.05\n\
             yesterday,A,B,1000,50,-4,3.2,0.05\n"
        );
        let err = AdsTable::from_reader(csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains("3 invalid value(s)"));
        assert!(msg.contains("row 2, column 'impressions': 'lots'"));
        assert!(msg.contains("row 3, column 'date': 'yesterday'"));
        assert!(msg.contains("row 3, column 'spend': '-4'"));
    }

    #[test]
    fn test_dates_with_time_part_and_float_counts() {
        let csv = format!("{HEADER}\n2025-01-05 00:00:00,A,B,1200.0,30,10,2,0.025\n");
        let table = AdsTable::from_reader(csv.as_bytes()).unwrap();
        let r = &table.records()[0];
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(r.impressions, 1200);
        assert_eq!(
            table.date_range(),
            Some((r.date, r.date))
        );
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "2025-01-01,A,B,10,1,1.0,1.0,0.1").unwrap();
        let table = AdsTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 1);

        let err = AdsTable::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
