//! Config 命令处理

use anyhow::Result;
use colored::Colorize;

use crate::config::CliConfig;
use crate::ConfigAction;

pub fn handle(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(),
        ConfigAction::Init { force } => init_config(force),
    }
}

fn show_config() -> Result<()> {
    let path = CliConfig::config_path()?;
    let config = CliConfig::load()?;

    if path.exists() {
        println!("{}\n", format!("配置文件: {:?}", path).bold());
    } else {
        println!("{}\n", "配置文件不存在，使用默认配置".yellow());
    }
    println!("{}", config.to_toml()?);
    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = CliConfig::config_path()?;
    if path.exists() && !force {
        anyhow::bail!("配置文件已存在: {:?} (使用 --force 覆盖)", path);
    }

    let path = CliConfig::default().save()?;
    println!("{} 配置文件已写入: {:?}", "✓".green().bold(), path);
    Ok(())
}
