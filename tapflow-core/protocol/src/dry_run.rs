//! 演练执行器
//!
//! 不连接真实设备，只记录动作并按预设结果回答探测类动作。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use tapflow_common::{Step, StepKind};

use crate::{ActionExecutor, ActionOutcome, ProtocolError, Result};

/// 演练预设结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunProfile {
    /// 图像匹配是否找到
    #[serde(default = "default_image_found")]
    pub image_found: bool,

    /// 图像匹配分数
    #[serde(default = "default_match_score")]
    pub match_score: f64,

    /// 获取音量返回值 (分贝)
    #[serde(default)]
    pub volume: f64,

    /// 声音比对相似度
    #[serde(default)]
    pub similarity: f64,
}

fn default_image_found() -> bool {
    true
}

fn default_match_score() -> f64 {
    0.9
}

impl Default for DryRunProfile {
    fn default() -> Self {
        Self {
            image_found: default_image_found(),
            match_score: default_match_score(),
            volume: 0.0,
            similarity: 0.0,
        }
    }
}

/// 演练执行器
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    profile: DryRunProfile,
    executed: AtomicU64,
}

impl DryRunExecutor {
    pub fn new(profile: DryRunProfile) -> Self {
        Self {
            profile,
            executed: AtomicU64::new(0),
        }
    }

    /// 已执行的动作数
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, step: &Step) -> Result<ActionOutcome> {
        if step.kind.category() != tapflow_common::StepCategory::Leaf {
            return Err(ProtocolError::UnsupportedAction(
                step.kind.type_name().to_string(),
            ));
        }

        self.executed.fetch_add(1, Ordering::Relaxed);
        info!("[演练] 执行动作 {} ({})", step.kind.type_name(), step.label());

        let outcome = match &step.kind {
            StepKind::ImageMatch(_) if self.profile.image_found => {
                ActionOutcome::ok().with_match(0, 0, self.profile.match_score)
            }
            StepKind::ImageMatch(spec) => {
                ActionOutcome::failed(format!("未找到模板: {}", spec.template))
            }
            StepKind::GetVolume(_) => ActionOutcome::ok().with_volume(self.profile.volume),
            StepKind::SoundCheck(_) => {
                ActionOutcome::ok().with_similarity(self.profile.similarity)
            }
            _ => ActionOutcome::ok(),
        };

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapflow_common::{ImageMatchSpec, LoopSpec};

    fn image_step() -> Step {
        Step::new(
            "m1",
            StepKind::ImageMatch(ImageMatchSpec {
                template: "home.png".to_string(),
                threshold: 0.8,
                region: None,
                color_invariant: false,
            }),
        )
    }

    #[tokio::test]
    async fn test_dry_run_profile_answers_conditions() {
        let executor = DryRunExecutor::new(DryRunProfile {
            image_found: false,
            match_score: 0.0,
            volume: 48.0,
            similarity: 0.6,
        });

        let outcome = executor.execute(&image_step()).await.unwrap();
        assert!(!outcome.success);

        let tap = Step::new("t1", StepKind::Tap { x: 1, y: 2 });
        assert!(executor.execute(&tap).await.unwrap().success);
        assert_eq!(executor.executed(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_rejects_control_steps() {
        let executor = DryRunExecutor::default();
        let step = Step::new("l1", StepKind::Loop(LoopSpec::times(2)));

        assert!(executor.execute(&step).await.is_err());
        assert_eq!(executor.executed(), 0);
    }
}
