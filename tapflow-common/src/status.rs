//! 运行状态与进度

use serde::{Deserialize, Serialize};
use std::fmt;

/// 场景运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// 运行中
    Running,
    /// 通过
    Pass,
    /// 失败
    Fail,
    /// 跳过
    Skip,
    /// 被取消
    Stopped,
}

impl RunStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
            RunStatus::Skip => "SKIP",
            RunStatus::Stopped => "STOPPED",
        };
        f.write_str(text)
    }
}

/// 运行进度
///
/// `total` 为 `None` 表示总步数无法预估 (含 while、条件分支或变量次数循环)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProgress {
    pub current: u64,
    pub total: Option<u64>,
}

impl RunProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self { current: 0, total }
    }
}

/// 推送给观察者的运行快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// 运行键
    pub scenario_key: String,
    pub status: RunStatus,
    pub progress: RunProgress,
}

/// 运行结束摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 已执行的动作数
    pub actions_count: u64,
}

impl RunSummary {
    pub fn new(status: RunStatus, message: Option<String>, actions_count: u64) -> Self {
        Self {
            status,
            message,
            actions_count,
        }
    }
}
