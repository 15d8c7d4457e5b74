//! Scenario 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tapflow_common::{RunSnapshot, RunStatus, StepCategory};
use tapflow_executor::{
    estimate_total, matches_pattern, validate_structure, EngineConfig, RunController, Scenario,
};
use tapflow_protocol::DryRunExecutor;

use super::output::{self, OutputFormat, TableRow};
use crate::config::CliConfig;
use crate::{DryRunArgs, ScenarioAction};

const SCENARIO_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

pub async fn handle(action: ScenarioAction) -> Result<()> {
    match action {
        ScenarioAction::Run {
            file,
            dry_run,
            format,
            output,
        } => run_scenario(&file, &dry_run, format, output.as_deref()).await,
        ScenarioAction::Batch {
            files,
            pattern,
            dry_run,
            format,
            output,
        } => run_batch(files, pattern.as_deref(), &dry_run, format, output.as_deref()).await,
        ScenarioAction::Check { file } => check_scenario(&file),
        ScenarioAction::List => list_scenarios(),
    }
}

async fn run_scenario(
    file: &str,
    args: &DryRunArgs,
    format: OutputFormat,
    output: Option<&str>,
) -> Result<()> {
    let scenario = load_with_spinner(Path::new(file))?;

    if format == OutputFormat::Text {
        println!();
        if let Some(desc) = &scenario.description {
            println!("描述: {}", desc.bright_black());
        }
        println!("步骤数: {}", scenario.steps.len().to_string().yellow());
        if !scenario.tags.is_empty() {
            println!("标签: {}", scenario.tags.join(", ").bright_black());
        }
        println!("\n{}\n", "开始执行场景...".bold());
    }

    let (controller, events) = build_controller(args)?;
    let (progress, watcher) = watch_progress(events)?;

    let key = RunController::new_run_key();
    let report = {
        let run = controller.run_scenario_with_key(&key, &scenario);
        tokio::pin!(run);

        tokio::select! {
            report = &mut run => report,
            _ = tokio::signal::ctrl_c() => {
                warn!("收到中断信号，取消运行 {}", key);
                controller.cancel(&key).await;
                run.await
            }
        }
    };

    drop(controller);
    let _ = watcher.await;
    progress.finish_and_clear();

    match output::serialize(&report, format)? {
        Some(content) => output::emit(&content, output)?,
        None => {
            output::print_report(&report);
            if let Some(path) = output {
                output::emit(&report.to_json()?, Some(path))?;
            }
        }
    }

    match report.status {
        RunStatus::Fail => anyhow::bail!("场景执行失败"),
        RunStatus::Stopped => anyhow::bail!("场景执行已取消"),
        _ => Ok(()),
    }
}

async fn run_batch(
    files: Vec<String>,
    pattern: Option<&str>,
    args: &DryRunArgs,
    format: OutputFormat,
    output: Option<&str>,
) -> Result<()> {
    let paths = match pattern {
        Some(pattern) => {
            let config = CliConfig::load()?;
            let scenario_dir = config.get_scenario_dir();
            scenario_files(&scenario_dir)?
                .into_iter()
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| matches_pattern(pattern, name))
                        .unwrap_or(false)
                })
                .collect()
        }
        None => files.into_iter().map(PathBuf::from).collect::<Vec<_>>(),
    };

    if paths.is_empty() {
        anyhow::bail!("没有可执行的场景文件");
    }

    let scenarios = paths
        .iter()
        .map(|path| {
            Scenario::from_file(path).with_context(|| format!("加载场景失败: {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("批量执行 {} 个场景", scenarios.len());

    let (controller, events) = build_controller(args)?;
    let (progress, watcher) = watch_progress(events)?;

    let batch = {
        let run = controller.run_batch(&scenarios);
        tokio::pin!(run);

        tokio::select! {
            batch = &mut run => batch,
            _ = tokio::signal::ctrl_c() => {
                warn!("收到中断信号，取消批量执行");
                controller.cancel_batch().await;
                run.await
            }
        }
    };

    drop(controller);
    let _ = watcher.await;
    progress.finish_and_clear();

    match output::serialize(&batch, format)? {
        Some(content) => output::emit(&content, output)?,
        None => {
            output::print_batch(&batch);
            if let Some(path) = output {
                output::emit(&batch.to_json()?, Some(path))?;
            }
        }
    }

    if batch.failed > 0 || batch.stopped > 0 {
        anyhow::bail!(
            "批量执行未全部通过: 失败 {}, 取消 {}",
            batch.failed,
            batch.stopped
        );
    }
    Ok(())
}

fn check_scenario(file: &str) -> Result<()> {
    let path = Path::new(file);
    let scenario =
        Scenario::from_file(path).with_context(|| format!("加载场景失败: {:?}", path))?;

    println!("场景名称: {}", scenario.name.cyan().bold());
    println!("步骤数: {}", scenario.steps.len().to_string().yellow());

    let openers = count_category(&scenario, StepCategory::BlockOpener);
    let leaves = count_category(&scenario, StepCategory::Leaf);
    println!("块数: {}  动作步骤: {}", openers, leaves);

    match estimate_total(&scenario.steps) {
        Some(total) => println!("预估动作数: {}", total.to_string().green()),
        None => println!("预估动作数: {}", "无法预估 (含条件分支、while 或变量循环)".bright_black()),
    }

    let issues = validate_structure(&scenario.steps);
    if issues.is_empty() {
        println!("\n{} 块结构正确", "✓".green().bold());
        return Ok(());
    }

    println!();
    for issue in &issues {
        println!("{} {}", "✗".red().bold(), issue);
    }
    anyhow::bail!("发现 {} 个结构问题", issues.len())
}

fn list_scenarios() -> Result<()> {
    let config = CliConfig::load()?;
    let scenario_dir = config.get_scenario_dir();

    if !scenario_dir.exists() {
        println!("{}", format!("场景目录不存在: {:?}", scenario_dir).yellow());
        println!("\n可以通过设置配置文件中的 scenario_dir 来指定场景目录");
        return Ok(());
    }

    println!("{}\n", format!("场景目录: {:?}", scenario_dir).bold());

    let mut entries = Vec::new();
    for path in scenario_files(&scenario_dir)? {
        match Scenario::from_file(&path) {
            Ok(scenario) => entries.push(ScenarioEntry::new(&path, &scenario)),
            Err(e) => warn!("跳过无法解析的场景文件 {:?}: {}", path, e),
        }
    }

    if entries.is_empty() {
        println!("{}", "没有找到任何场景文件".yellow());
        return Ok(());
    }

    println!("找到 {} 个场景:\n", entries.len().to_string().green());
    output::print_table(&entries);
    Ok(())
}

/// 场景列表条目
#[derive(Debug)]
struct ScenarioEntry {
    file: String,
    name: String,
    steps: usize,
    tags: Vec<String>,
}

impl ScenarioEntry {
    fn new(path: &Path, scenario: &Scenario) -> Self {
        Self {
            file: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: scenario.name.clone(),
            steps: scenario.steps.len(),
            tags: scenario.tags.clone(),
        }
    }
}

impl TableRow for ScenarioEntry {
    fn headers() -> Vec<&'static str> {
        vec!["文件", "名称", "步骤", "标签"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.file.clone(),
            self.name.clone(),
            self.steps.to_string(),
            self.tags.join(","),
        ]
    }
}

fn count_category(scenario: &Scenario, category: StepCategory) -> usize {
    scenario
        .steps
        .iter()
        .filter(|step| step.category() == category)
        .count()
}

/// 列出目录中的场景文件 (按文件名排序)
fn scenario_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("读取场景目录失败: {:?}", dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|s| s.to_str());
        if ext.map_or(false, |ext| SCENARIO_EXTENSIONS.contains(&ext)) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_with_spinner(path: &Path) -> Result<Scenario> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("加载场景: {:?}", path));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let scenario = match Scenario::from_file(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).with_context(|| format!("加载场景失败: {:?}", path));
        }
    };

    spinner.finish_with_message(format!(
        "{} 场景加载成功: {}",
        "✓".green().bold(),
        scenario.name.cyan()
    ));
    Ok(scenario)
}

/// 按配置与命令行参数构建演练执行的控制器
fn build_controller(
    args: &DryRunArgs,
) -> Result<(RunController, UnboundedReceiver<RunSnapshot>)> {
    let config = CliConfig::load()?;

    let mut profile = config.dry_run;
    if args.no_match {
        profile.image_found = false;
    }
    if let Some(volume) = args.volume {
        profile.volume = volume;
    }
    if let Some(similarity) = args.similarity {
        profile.similarity = similarity;
    }

    let mut engine = match &args.engine_config {
        Some(path) => EngineConfig::load_from_file(Path::new(path))
            .with_context(|| format!("加载引擎配置失败: {}", path))?,
        None => config.engine,
    };
    if let Some(delay) = args.delay {
        engine.step_delay_ms = delay;
    }

    info!(
        "演练执行: 图像匹配={}, 音量={}, 相似度={}, 步骤延迟={}ms",
        profile.image_found, profile.volume, profile.similarity, engine.step_delay_ms
    );

    let executor = Arc::new(DryRunExecutor::new(profile));
    Ok(RunController::with_channel(executor, engine))
}

/// 把运行快照渲染到进度条，总数未知时显示为转圈
fn watch_progress(
    mut events: UnboundedReceiver<RunSnapshot>,
) -> Result<(ProgressBar, JoinHandle<()>)> {
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-");
    let spinner_style =
        ProgressStyle::default_spinner().template("{spinner:.green} 已执行 {pos} 个动作 {msg}")?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(spinner_style.clone());
    progress.enable_steady_tick(Duration::from_millis(100));

    let bar = progress.clone();
    let watcher = tokio::spawn(async move {
        while let Some(snapshot) = events.recv().await {
            // 每个运行开始时按是否可预估切换样式
            if snapshot.status == RunStatus::Running && snapshot.progress.current == 0 {
                match snapshot.progress.total {
                    Some(total) => {
                        bar.set_style(bar_style.clone());
                        bar.set_length(total);
                    }
                    None => bar.set_style(spinner_style.clone()),
                }
            }

            bar.set_position(snapshot.progress.current);
            if snapshot.status.is_terminal() {
                bar.set_message(output::colored_status(snapshot.status).to_string());
            }
        }
    });

    Ok((progress, watcher))
}
