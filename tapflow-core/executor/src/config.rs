//! 执行引擎配置
//!
//! 支持从多个源加载:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// while 循环的最大迭代次数，超过后记录警告并退出循环
pub const WHILE_ITERATION_LIMIT: u32 = 1000;

/// 步骤间延迟环境变量
pub const STEP_DELAY_ENV: &str = "TAPFLOW_STEP_DELAY_MS";

/// 动作超时环境变量
pub const ACTION_TIMEOUT_ENV: &str = "TAPFLOW_ACTION_TIMEOUT_SECS";

/// 执行引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 叶子/变量步骤之后的延迟 (毫秒)，0 表示不延迟
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// 单个动作的超时时间 (秒)，默认 0 不限制，由动作执行器自行处理
    #[serde(default = "default_action_timeout_secs")]
    pub default_action_timeout_secs: u64,
}

fn default_step_delay_ms() -> u64 {
    300
}

fn default_action_timeout_secs() -> u64 {
    0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            default_action_timeout_secs: default_action_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// 无延迟配置 (测试与演练使用)
    pub fn immediate() -> Self {
        Self {
            step_delay_ms: 0,
            ..Self::default()
        }
    }

    /// 步骤间延迟
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// 动作超时，未配置时返回 None
    pub fn action_timeout(&self) -> Option<Duration> {
        match self.default_action_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// 从指定文件加载配置并应用环境变量覆盖
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let mut config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        config.apply_env_vars()?;
        Ok(config)
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("解析 TOML 配置失败")
    }

    /// 从环境变量覆盖
    pub fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(delay) = env::var(STEP_DELAY_ENV) {
            self.step_delay_ms = delay
                .trim()
                .parse()
                .with_context(|| format!("无效的 {} 值: {}", STEP_DELAY_ENV, delay))?;
        }
        if let Ok(timeout) = env::var(ACTION_TIMEOUT_ENV) {
            self.default_action_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("无效的 {} 值: {}", ACTION_TIMEOUT_ENV, timeout))?;
        }
        Ok(())
    }
}
