//! TapFlow CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::output::OutputFormat;

#[derive(Parser)]
#[command(name = "tapflow")]
#[command(about = "TapFlow - 设备交互场景自动化执行工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (RUST_LOG 优先)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 场景管理
    Scenario {
        #[command(subcommand)]
        action: ScenarioAction,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// 演练结果覆盖参数
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DryRunArgs {
    /// 图像匹配一律返回未找到
    #[arg(long)]
    no_match: bool,

    /// 获取音量的返回值 (分贝)
    #[arg(long)]
    volume: Option<f64>,

    /// 声音比对的相似度
    #[arg(long)]
    similarity: Option<f64>,

    /// 步骤间延迟 (毫秒)，覆盖配置文件
    #[arg(long)]
    delay: Option<u64>,

    /// 引擎配置文件 (TOML/YAML/JSON)，替换配置文件中的 [engine] 段
    #[arg(long)]
    engine_config: Option<String>,
}

#[derive(Subcommand)]
pub enum ScenarioAction {
    /// 运行场景
    Run {
        /// 场景文件路径
        file: String,

        #[command(flatten)]
        dry_run: DryRunArgs,

        /// 输出格式 (text/json/yaml)
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// 报告输出文件
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 串行批量运行场景
    Batch {
        /// 场景文件列表
        files: Vec<String>,

        /// 按文件名模式从场景目录挑选 (*=全部, prefix*=前缀, *suffix=后缀)
        #[arg(short, long, conflicts_with = "files")]
        pattern: Option<String>,

        #[command(flatten)]
        dry_run: DryRunArgs,

        /// 输出格式 (text/json/yaml)
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// 报告输出文件
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 检查场景块结构并预估步数
    Check {
        /// 场景文件路径
        file: String,
    },

    /// 列出场景
    List,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// 显示当前配置
    Show,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的配置
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("TapFlow CLI 启动");

    match cli.command {
        Commands::Scenario { action } => commands::scenario::handle(action).await?,
        Commands::Config { action } => commands::config::handle(action)?,
    }

    Ok(())
}
