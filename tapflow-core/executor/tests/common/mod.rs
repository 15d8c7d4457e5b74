//! 集成测试共用的记录型执行器

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use tapflow_common::{Condition, ConditionGroup, LogicOperator, Step, StepKind};
use tapflow_protocol::{ActionExecutor, ActionOutcome, ProtocolError, Result};

/// 初始化测试日志，级别由 RUST_LOG 控制
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 记录所有动作的执行器
///
/// 模板名为 "yes" 的图像匹配总是成功，"no" 总是失败，
/// "countdown" 在前 `countdown` 次调用时成功。
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<Step>>,
    pub volume: Mutex<f64>,
    pub countdown: AtomicUsize,
    /// 返回 success=false 的步骤标识
    pub failing: HashSet<String>,
    /// 返回错误的步骤标识
    pub erroring: HashSet<String>,
    /// 第 N 次点击后取消
    pub cancel_after_taps: Option<(usize, CancellationToken)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(self, volume: f64) -> Self {
        *self.volume.lock().unwrap() = volume;
        self
    }

    pub fn with_countdown(self, count: usize) -> Self {
        self.countdown.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing(mut self, step_id: &str) -> Self {
        self.failing.insert(step_id.to_string());
        self
    }

    pub fn erroring(mut self, step_id: &str) -> Self {
        self.erroring.insert(step_id.to_string());
        self
    }

    pub fn cancel_after_taps(mut self, taps: usize, token: CancellationToken) -> Self {
        self.cancel_after_taps = Some((taps, token));
        self
    }

    /// 已记录的点击坐标
    pub fn taps(&self) -> Vec<(i32, i32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|step| match step.kind {
                StepKind::Tap { x, y } => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    /// 指定类型的调用次数
    pub fn count(&self, type_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|step| step.kind.type_name() == type_name)
            .count()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, step: &Step) -> Result<ActionOutcome> {
        self.calls.lock().unwrap().push(step.clone());

        if self.erroring.contains(&step.id) {
            return Err(ProtocolError::DeviceError(format!("{} 设备离线", step.id)));
        }
        if self.failing.contains(&step.id) {
            return Ok(ActionOutcome::failed(format!("{} 执行失败", step.id)));
        }

        let outcome = match &step.kind {
            StepKind::Tap { .. } => {
                if let Some((limit, token)) = &self.cancel_after_taps {
                    if self.taps().len() >= *limit {
                        token.cancel();
                    }
                }
                ActionOutcome::ok()
            }
            StepKind::ImageMatch(spec) => match spec.template.as_str() {
                "yes" => ActionOutcome::ok().with_match(10, 10, 0.95),
                "countdown" => {
                    let remaining = self.countdown.load(Ordering::SeqCst);
                    if remaining > 0 {
                        self.countdown.store(remaining - 1, Ordering::SeqCst);
                        ActionOutcome::ok().with_match(10, 10, 0.9)
                    } else {
                        ActionOutcome::failed("countdown exhausted")
                    }
                }
                _ => ActionOutcome::failed("not found"),
            },
            StepKind::GetVolume(_) => ActionOutcome::ok().with_volume(*self.volume.lock().unwrap()),
            StepKind::SoundCheck(_) => ActionOutcome::ok().with_similarity(0.5),
            _ => ActionOutcome::ok(),
        };

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn image_condition(template: &str) -> Condition {
    Condition::new("image-match", json!({ "template": template }))
}

pub fn group(templates: &[&str], operator: LogicOperator) -> ConditionGroup {
    ConditionGroup::new(
        templates.iter().map(|t| image_condition(t)).collect(),
        operator,
    )
}

pub fn tap(id: &str, x: i32, y: i32) -> Step {
    Step::new(id, StepKind::Tap { x, y })
}

pub fn step(id: &str, kind: StepKind) -> Step {
    Step::new(id, kind)
}
