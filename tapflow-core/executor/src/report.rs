//! 执行报告

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tapflow_common::{RunStatus, RunSummary};

/// 执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// 运行键
    pub run_key: String,

    /// 场景名称
    pub scenario_name: String,

    /// 场景描述
    pub description: Option<String>,

    /// 标签
    pub tags: Vec<String>,

    /// 最终状态
    pub status: RunStatus,

    /// 终止信息 (success/skip/fail 步骤的 message 或致命错误)
    pub message: Option<String>,

    /// 已执行的动作数 (叶子动作与变量操作)
    pub actions_count: u64,

    /// 成功的步骤数
    pub passed_count: usize,

    /// 失败的步骤数
    pub failed_count: usize,

    /// 总耗时（毫秒）
    pub duration_ms: u64,

    /// 开始时间
    pub started_at: DateTime<Utc>,

    /// 步骤报告列表
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    pub fn new(run_key: &str, scenario_name: &str) -> Self {
        Self {
            run_key: run_key.to_string(),
            scenario_name: scenario_name.to_string(),
            description: None,
            tags: Vec::new(),
            status: RunStatus::Running,
            message: None,
            actions_count: 0,
            passed_count: 0,
            failed_count: 0,
            duration_ms: 0,
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    /// 未开始即被取消的运行
    pub fn stopped(run_key: &str, scenario_name: &str) -> Self {
        let mut report = Self::new(run_key, scenario_name);
        report.status = RunStatus::Stopped;
        report
    }

    pub fn add_step(&mut self, step: StepReport) {
        match step.status {
            StepStatus::Success => self.passed_count += 1,
            StepStatus::Failed => self.failed_count += 1,
            StepStatus::Skipped => {}
        }

        self.steps.push(step);
    }

    /// 是否通过
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Pass
    }

    /// 运行结束摘要
    pub fn summary(&self) -> RunSummary {
        RunSummary::new(self.status, self.message.clone(), self.actions_count)
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

impl From<&ExecutionReport> for RunSummary {
    fn from(report: &ExecutionReport) -> Self {
        report.summary()
    }
}

/// 步骤报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 步骤索引
    pub step_index: usize,

    /// 步骤标识
    pub step_id: String,

    /// 步骤类型
    pub step_type: String,

    /// 步骤描述
    pub description: String,

    /// 步骤状态
    pub status: StepStatus,

    /// 错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 耗时（毫秒）
    pub duration_ms: u64,

    /// 输出内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl StepReport {
    pub fn success(index: usize, step_id: &str, step_type: &str, description: &str) -> Self {
        Self {
            step_index: index,
            step_id: step_id.to_string(),
            step_type: step_type.to_string(),
            description: description.to_string(),
            status: StepStatus::Success,
            error: None,
            duration_ms: 0,
            output: None,
        }
    }

    pub fn failed(
        index: usize,
        step_id: &str,
        step_type: &str,
        description: &str,
        error: &str,
    ) -> Self {
        Self {
            status: StepStatus::Failed,
            error: Some(error.to_string()),
            ..Self::success(index, step_id, step_type, description)
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failed,
    /// 失败但策略为 skip
    Skipped,
}

/// 批量执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// 场景总数
    pub total: usize,

    /// 通过数
    pub passed: usize,

    /// 失败数
    pub failed: usize,

    /// 跳过数
    pub skipped: usize,

    /// 取消数
    pub stopped: usize,

    /// 总耗时（毫秒）
    pub duration_ms: u64,

    /// 各场景的执行报告
    pub reports: Vec<ExecutionReport>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            stopped: 0,
            duration_ms: 0,
            reports: Vec::new(),
        }
    }

    pub fn add_report(&mut self, report: ExecutionReport) {
        self.total += 1;
        match report.status {
            RunStatus::Pass => self.passed += 1,
            RunStatus::Fail => self.failed += 1,
            RunStatus::Skip => self.skipped += 1,
            RunStatus::Stopped | RunStatus::Running => self.stopped += 1,
        }
        self.reports.push(report);
    }

    /// 是否全部通过
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_step_counts() {
        let mut report = ExecutionReport::new("k1", "demo");
        report.add_step(StepReport::success(0, "s1", "tap", "s1"));
        report.add_step(StepReport::failed(1, "s2", "tap", "s2", "device offline"));
        report.add_step(
            StepReport::failed(2, "s3", "tap", "s3", "ignored").with_status(StepStatus::Skipped),
        );

        assert_eq!(report.passed_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.steps.len(), 3);
    }

    #[test]
    fn test_summary() {
        let mut report = ExecutionReport::new("k1", "demo");
        report.status = RunStatus::Fail;
        report.message = Some("登录失败".to_string());
        report.actions_count = 4;

        let summary = RunSummary::from(&report);
        assert_eq!(summary.status, RunStatus::Fail);
        assert_eq!(summary.message.as_deref(), Some("登录失败"));
        assert_eq!(summary.actions_count, 4);
    }

    #[test]
    fn test_batch_counts() {
        let mut batch = BatchReport::new();
        let mut pass = ExecutionReport::new("a", "a");
        pass.status = RunStatus::Pass;
        batch.add_report(pass);
        batch.add_report(ExecutionReport::stopped("b", "b"));

        assert_eq!(batch.total, 2);
        assert_eq!(batch.passed, 1);
        assert_eq!(batch.stopped, 1);
        assert!(!batch.all_passed());
    }

    #[test]
    fn test_report_export() {
        let report = ExecutionReport::new("k1", "export");
        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"RUNNING\""));

        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("scenario_name: export"));
    }
}
