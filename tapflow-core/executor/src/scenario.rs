//! 测试场景定义

use serde::{Deserialize, Serialize};
use std::path::Path;

use tapflow_common::Step;

use crate::{ExecutorError, Result};

/// 测试场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// 场景名称
    pub name: String,

    /// 场景描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 标签
    #[serde(default)]
    pub tags: Vec<String>,

    /// 步骤列表 (扁平，嵌套由块标记推导)
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// 创建场景
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            steps,
        }
    }

    /// 根据扩展名从文件加载场景 (.json 按 JSON 解析，其余按 YAML)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecutorError::ScenarioLoadFailed(format!("{}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// 从 YAML 字符串加载场景
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 从 JSON 字符串加载场景
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }
}

/// 简单的 glob 匹配 (支持 `*` 和 `?`)，用于按名称挑选批量执行的场景文件
pub fn matches_pattern(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();
    glob_match_helper(&pattern_chars, &text_chars, 0, 0)
}

fn glob_match_helper(pattern: &[char], text: &[char], pi: usize, ti: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }

    match pattern[pi] {
        // * 匹配零个或多个字符
        '*' => (ti..=text.len()).any(|i| glob_match_helper(pattern, text, pi + 1, i)),
        '?' => ti < text.len() && glob_match_helper(pattern, text, pi + 1, ti + 1),
        c => ti < text.len() && text[ti] == c && glob_match_helper(pattern, text, pi + 1, ti + 1),
    }
}
