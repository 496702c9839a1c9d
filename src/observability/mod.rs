//! 可观测性：控制台可读日志 + 每次运行独立目录下的 JSON 行日志
//!
//! Telemetry 句柄由 main 显式创建并注入各组件；决策记录（agent / 输入摘要 / 输出摘要 / 原因）
//! 作为 target = "adscope::decision" 的结构化事件输出。

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 决策记录中输入 / 输出摘要的最大字符数
pub const DECISION_SUMMARY_CHARS: usize = 200;

/// JSON 日志文件名
pub const LOG_FILE_NAME: &str = "app.json";

/// 遥测句柄：持有本次运行的日志目录
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    run_dir: Option<PathBuf>,
}

impl Telemetry {
    /// 创建 `<log_dir>/run_<YYYYmmdd_HHMMSS>/app.json` 并安装全局 subscriber：
    /// 控制台 INFO（RUST_LOG 可覆盖），文件 DEBUG（JSON，含源码位置）
    pub fn init(log_dir: &Path) -> std::io::Result<Self> {
        let run_id = chrono::Local::now().format("run_%Y%m%d_%H%M%S").to_string();
        let run_dir = log_dir.join(run_id);
        std::fs::create_dir_all(&run_dir)?;
        let file = File::create(run_dir.join(LOG_FILE_NAME))?;

        let console_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let console = fmt::layer()
            .with_target(false)
            .with_filter(console_filter);

        let json = fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_current_span(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::DEBUG);

        if let Err(e) = tracing_subscriber::registry()
            .with(console)
            .with(json)
            .try_init()
        {
            eprintln!("tracing subscriber already installed: {e}");
        }

        Ok(Self {
            run_dir: Some(run_dir),
        })
    }

    /// 不安装 subscriber、不写文件（测试用）
    pub fn disabled() -> Self {
        Self { run_dir: None }
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// 记录一次智能体决策
    pub fn decision(&self, agent: &str, input: &str, output: &str, reason: &str) {
        tracing::info!(
            target: "adscope::decision",
            agent,
            input_summary = %summarize(input, DECISION_SUMMARY_CHARS),
            output_summary = %summarize(output, DECISION_SUMMARY_CHARS),
            reason,
            "Decision by {}: {}",
            agent,
            reason
        );
    }
}

/// 按字符截断，超出时追加 "..."
pub fn summarize(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
