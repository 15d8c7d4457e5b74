//! 进度预估与上报

use async_trait::async_trait;

use tapflow_common::{BlockMarker, CountType, Step, StepCategory, StepKind};

use crate::block::find_block_end;

/// 进度上报接口
///
/// 每执行完一个叶子动作或变量操作调用一次。
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_action(&self, current: u64);
}

/// 静态预估总步数
///
/// 计数循环按次数展开。遇到 while、条件分支、隐式 if
/// 或变量次数循环时无法预估，返回 None。
pub fn estimate_total(steps: &[Step]) -> Option<u64> {
    count_range(steps, 0, steps.len())
}

fn count_range(steps: &[Step], start: usize, end: usize) -> Option<u64> {
    let mut total: u64 = 0;
    let mut i = start;

    while i < end {
        let step = &steps[i];
        match &step.kind {
            StepKind::While(_) | StepKind::If(_) | StepKind::ElseIf(_) | StepKind::Else => {
                return None
            }
            StepKind::Loop(spec) => {
                if spec.count_type == CountType::Variable {
                    return None;
                }
                let loop_end = find_block_end(steps, i, &[BlockMarker::EndLoop]);
                if loop_end >= steps.len() {
                    return None;
                }
                let body = count_range(steps, i + 1, loop_end)?;
                total = total.saturating_add(body.saturating_mul(spec.count as u64));
                i = loop_end + 1;
                continue;
            }
            _ => {}
        }

        match step.category() {
            StepCategory::BlockOpener => return None,
            StepCategory::Leaf | StepCategory::Data => total += 1,
            _ => {}
        }
        i += 1;
    }

    Some(total)
}
