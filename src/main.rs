//! adscope - 广告投放数据多智能体分析
//!
//! 入口：加载 .env 与配置、初始化日志、检查凭据，然后运行一次分析管线。
//! 退出码：0 运行完成（包括部分步骤失败的降级运行），1 缺少 GROQ_API_KEY，2 运行终止。

use std::path::PathBuf;
use std::process::ExitCode;

use adscope::config::{load_config, AppConfig};
use adscope::llm::GROQ_API_KEY_ENV;
use adscope::observability::Telemetry;
use adscope::pipeline::AnalysisPipeline;
use anyhow::Context;
use clap::Parser;

const EXIT_MISSING_CREDENTIAL: u8 = 1;
const EXIT_ABORTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "adscope", version, about = "Multi-agent analysis of ad performance data")]
struct Cli {
    /// The analysis query (e.g. "Analyze ROAS drop")
    query: String,

    /// Extra config file layered over config/default.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ads CSV to analyze (overrides data.csv_path)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Where report artifacts are written (overrides app.output_dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let (mut cfg, config_error) = match load_config(cli.config.clone()) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(data) = cli.data {
        cfg.data.csv_path = data;
    }
    if let Some(dir) = cli.output_dir {
        cfg.app.output_dir = dir;
    }

    let telemetry = Telemetry::init(&cfg.app.log_dir).context("Failed to initialize logging")?;
    if let Some(e) = config_error {
        tracing::warn!("Config load failed ({}), using defaults", e);
    }

    let Some(api_key) = std::env::var(GROQ_API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()) else {
        tracing::error!("{} not found in environment variables. Exiting.", GROQ_API_KEY_ENV);
        return Ok(ExitCode::from(EXIT_MISSING_CREDENTIAL));
    };

    let pipeline = match AnalysisPipeline::from_config(&cfg, &api_key, telemetry) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to initialize agents");
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(EXIT_ABORTED));
        }
    };

    match pipeline.run(&cli.query).await {
        Ok(summary) => {
            if summary.is_degraded() {
                tracing::warn!(
                    failed_steps = summary.failed_steps(),
                    "Run completed with omitted steps"
                );
            }
            println!("Report saved to {}", summary.artifacts.report.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = ?e, "Run aborted");
            eprintln!("Run aborted: {e}");
            Ok(ExitCode::from(EXIT_ABORTED))
        }
    }
}
