//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ADSCOPE__*` 覆盖（双下划线表示嵌套，如 `ADSCOPE__GUARD__RETRIES=5`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{ExecutorConfig, RetryPolicy};
use crate::llm::GROQ_DEFAULT_MODEL;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub data: DataSection,
    pub llm: LlmSection,
    pub guard: GuardSection,
    pub pipeline: PipelineSection,
}

/// [app] 段：产物与日志目录、提示词覆盖目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 存在 `<name>.txt` 时覆盖内置提示词
    pub prompts_dir: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            prompts_dir: None,
        }
    }
}

/// [data] 段：投放数据 CSV
#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("data/ads.csv")
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
        }
    }
}

/// [llm] 段：模型、端点与采样温度
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    /// 未设置时使用 Groq 官方端点
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    /// CreativeGenerator 专用温度
    #[serde(default = "default_creative_temperature")]
    pub creative_temperature: f32,
}

fn default_model() -> String {
    GROQ_DEFAULT_MODEL.to_string()
}

fn default_creative_temperature() -> f32 {
    0.7
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            temperature: 0.0,
            creative_temperature: default_creative_temperature(),
        }
    }
}

/// [guard] 段：每次能力调用的重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct GuardSection {
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// 首次重试前的等待（毫秒），之后每次翻倍
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl GuardSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.backoff_ms))
    }
}

/// [pipeline] 段：步骤间隔与隐式 top ads 指令
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 每步之后的等待（毫秒），0 关闭
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_top_ads_instruction")]
    pub top_ads_instruction: String,
}

fn default_step_delay_ms() -> u64 {
    5000
}

fn default_top_ads_instruction() -> String {
    ExecutorConfig::default().top_ads_instruction
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            top_ads_instruction: default_top_ads_instruction(),
        }
    }
}

impl PipelineSection {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            step_delay: Duration::from_millis(self.step_delay_ms),
            top_ads_instruction: self.top_ads_instruction.clone(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ADSCOPE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ADSCOPE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ADSCOPE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.output_dir, PathBuf::from("reports"));
        assert_eq!(cfg.llm.model, GROQ_DEFAULT_MODEL);
        assert_eq!(cfg.llm.creative_temperature, 0.7);
        assert_eq!(cfg.guard.retries, 3);
        let exec = cfg.pipeline.executor_config();
        assert_eq!(exec.step_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[guard]\nretries = 1\nbackoff_ms = 0\n\n[pipeline]\nstep_delay_ms = 0\n\n[data]\ncsv_path = \"fixtures/ads.csv\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.guard.retries, 1);
        assert_eq!(cfg.guard.retry_policy().max_attempts(), 2);
        assert!(cfg.pipeline.executor_config().step_delay.is_zero());
        assert_eq!(cfg.data.csv_path, PathBuf::from("fixtures/ads.csv"));
        // 未写的段保持默认
        assert_eq!(cfg.app.log_dir, PathBuf::from("logs"));
    }
}
