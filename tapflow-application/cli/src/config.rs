//! CLI 配置管理
//!
//! **数据存储方式**: TOML 文件 (~/.config/tapflow/config.toml)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use tapflow_executor::EngineConfig;
use tapflow_protocol::DryRunProfile;

/// CLI 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// 场景目录
    pub scenario_dir: Option<String>,

    /// 配置版本
    #[serde(default = "default_version")]
    pub version: String,

    /// 执行引擎配置
    #[serde(default)]
    pub engine: EngineConfig,

    /// 演练执行器的预设结果
    #[serde(default)]
    pub dry_run: DryRunProfile,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            scenario_dir: Some("./scenarios".to_string()),
            version: default_version(),
            engine: EngineConfig::default(),
            dry_run: DryRunProfile::default(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("tapflow").join("config.toml"))
    }

    /// 加载配置 (文件不存在时使用默认值)，并应用引擎环境变量覆盖
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("读取配置文件失败: {:?}", path))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("解析配置文件失败: {:?}", path))?
        } else {
            Self::default()
        };

        config.engine.apply_env_vars()?;
        Ok(config)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 保存配置
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;

        // 确保目录存在
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        fs::write(&path, self.to_toml()?)
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(path)
    }

    /// 序列化为 TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置失败")
    }

    /// 获取场景目录
    pub fn get_scenario_dir(&self) -> PathBuf {
        PathBuf::from(self.scenario_dir.as_deref().unwrap_or("./scenarios"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.scenario_dir, Some("./scenarios".to_string()));
        assert_eq!(config.engine.step_delay_ms, 300);
        assert!(config.dry_run.image_found);
    }

    #[test]
    fn test_partial_sections() {
        let config = CliConfig::from_toml_str(
            r#"
scenario_dir = "/data/scenarios"

[engine]
step_delay_ms = 50

[dry_run]
volume = 72.5
"#,
        )
        .unwrap();

        assert_eq!(config.get_scenario_dir(), PathBuf::from("/data/scenarios"));
        assert_eq!(config.version, "1.0");
        assert_eq!(config.engine.step_delay_ms, 50);
        assert_eq!(config.engine.default_action_timeout_secs, 0);
        assert_eq!(config.dry_run.volume, 72.5);
        assert_eq!(config.dry_run.match_score, 0.9);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = CliConfig::default();
        config.dry_run.similarity = 0.75;

        let text = config.to_toml().unwrap();
        assert!(text.contains("[engine]"));
        assert_eq!(CliConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CliConfig::from_toml_str("").unwrap();
        assert_eq!(config.scenario_dir, None);
        assert_eq!(config.get_scenario_dir(), PathBuf::from("./scenarios"));
        assert_eq!(config.engine, EngineConfig::default());
    }
}
