//! CLI 通用输出格式化模块
//!
//! 提供 text/json/yaml 三种输出格式的通用实现

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::fs;

use tapflow_common::RunStatus;
use tapflow_executor::{BatchReport, ExecutionReport, StepStatus};

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// 可输出为表格行的数据 trait
pub trait TableRow {
    /// 返回表格列标题
    fn headers() -> Vec<&'static str>;

    /// 返回该项的表格行数据
    fn row(&self) -> Vec<String>;
}

/// 表格格式输出
pub fn print_table<T: TableRow>(items: &[T]) {
    let headers = T::headers();

    let header_line: String = headers
        .iter()
        .map(|h| format!("{:<24}", h))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", header_line.bold());
    println!("{}", "-".repeat(header_line.len()));

    for item in items {
        let row_line: String = item
            .row()
            .iter()
            .map(|c| format!("{:<24}", c))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}", row_line);
    }
}

/// 序列化为 JSON 或 YAML，文本格式返回 None
pub fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Json => Ok(Some(
            serde_json::to_string_pretty(value).context("序列化 JSON 失败")?,
        )),
        OutputFormat::Yaml => Ok(Some(
            serde_yaml::to_string(value).context("序列化 YAML 失败")?,
        )),
        OutputFormat::Text => Ok(None),
    }
}

/// 写入文件或打印到标准输出
pub fn emit(content: &str, output: Option<&str>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("写入报告失败: {}", path))?;
            println!("{} 报告已保存: {}", "✓".green().bold(), path.cyan());
        }
        None => println!("{}", content),
    }
    Ok(())
}

/// 状态着色
pub fn colored_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Pass => text.green().bold(),
        RunStatus::Fail => text.red().bold(),
        RunStatus::Skip => text.yellow().bold(),
        RunStatus::Stopped => text.magenta().bold(),
        RunStatus::Running => text.blue(),
    }
}

/// 文本格式的执行报告
pub fn print_report(report: &ExecutionReport) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "执行报告".bold());
    println!("{}", "=".repeat(60));
    println!();

    println!("场景名称: {}", report.scenario_name.cyan().bold());
    if let Some(desc) = &report.description {
        println!("场景描述: {}", desc.bright_black());
    }
    println!(
        "开始时间: {}",
        report
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!("执行时间: {} ms", report.duration_ms.to_string().yellow());
    println!();

    println!("步骤统计:");
    println!("  动作数: {}", report.actions_count.to_string().bright_blue());
    println!("  成功:   {}", report.passed_count.to_string().green());
    println!("  失败:   {}", report.failed_count.to_string().red());
    println!();

    if !report.steps.is_empty() {
        println!("步骤详情:");
        println!();

        for step in &report.steps {
            let status_icon = match step.status {
                StepStatus::Success => "✓".green(),
                StepStatus::Failed => "✗".red(),
                StepStatus::Skipped => "⊘".yellow(),
            };

            println!(
                "{} 步骤 {} [{}]: {}",
                status_icon.bold(),
                (step.step_index + 1).to_string().bright_black(),
                step.step_type,
                step.description
            );

            if let Some(output) = &step.output {
                println!("   输出: {}", output.bright_black());
            }
            if let Some(error) = &step.error {
                println!("   错误: {}", error.red());
            }
        }
        println!();
    }

    println!("{}", "=".repeat(60));
    print!("结果: {}", colored_status(report.status));
    match &report.message {
        Some(message) => println!(" ({})", message),
        None => println!(),
    }
    println!("{}", "=".repeat(60));
}

/// 文本格式的批量报告
pub fn print_batch(batch: &BatchReport) {
    println!("\n{}", "批量执行结果".bold());
    println!("{}", "-".repeat(60));

    for report in &batch.reports {
        println!(
            "{:<10} {:<32} {:>6} 动作 {:>8} ms",
            colored_status(report.status),
            report.scenario_name,
            report.actions_count,
            report.duration_ms
        );
        if let Some(message) = &report.message {
            println!("           {}", message.bright_black());
        }
    }

    println!("{}", "-".repeat(60));
    println!(
        "总计 {}, 通过 {}, 失败 {}, 跳过 {}, 取消 {}, 耗时 {} ms",
        batch.total.to_string().bold(),
        batch.passed.to_string().green(),
        batch.failed.to_string().red(),
        batch.skipped.to_string().yellow(),
        batch.stopped.to_string().magenta(),
        batch.duration_ms
    );
}
