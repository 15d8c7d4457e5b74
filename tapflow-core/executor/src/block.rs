//! 块结构解析
//!
//! 步骤以扁平列表存储，所有块边界的下标计算都集中在这里。

use serde::Serialize;
use std::fmt;
use tracing::debug;

use tapflow_common::{BlockMarker, Step, StepKind};

/// 从 `start` 向后查找处于同一嵌套层级、标记属于 `terminators` 的步骤
///
/// 起始步骤是块起始或中间标记时深度从 1 开始，否则从 0 开始。
/// 块起始步骤使深度加一，结束标记使深度减一。
/// 未找到 (或深度下溢) 时返回 `steps.len()`。
pub fn find_block_end(steps: &[Step], start: usize, terminators: &[BlockMarker]) -> usize {
    let Some(first) = steps.get(start) else {
        return steps.len();
    };

    let mut depth: usize = match first.marker() {
        Some(marker) if marker.is_mid_marker() => 1,
        _ if first.is_block_opener() => 1,
        _ => 0,
    };

    for (index, step) in steps.iter().enumerate().skip(start + 1) {
        if step.is_block_opener() {
            depth += 1;
            continue;
        }

        let Some(marker) = step.marker() else {
            continue;
        };

        if depth == 1 && terminators.contains(&marker) {
            debug!("块 {} 的结束位置: {}", start, index);
            return index;
        }

        if marker.is_terminator() {
            if depth <= 1 {
                // 结束标记多于起始步骤
                return steps.len();
            }
            depth -= 1;
        }
    }

    steps.len()
}

/// 按配对标识查找 `start` 之后的 endif
pub fn find_paired_endif(steps: &[Step], start: usize) -> Option<usize> {
    let pair_id = steps.get(start)?.pair_id.as_deref()?;
    steps
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, step)| {
            matches!(step.kind, StepKind::Endif) && step.pair_id.as_deref() == Some(pair_id)
        })
        .map(|(index, _)| index)
}

/// 按配对标识查找 `(start, endif)` 之间的 else
pub fn find_else_in_block(steps: &[Step], start: usize, endif: usize) -> Option<usize> {
    let pair_id = steps.get(start)?.pair_id.as_deref()?;
    let end = endif.min(steps.len());
    (start + 1..end).find(|&index| {
        let step = &steps[index];
        matches!(step.kind, StepKind::Else) && step.pair_id.as_deref() == Some(pair_id)
    })
}

/// 结构问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureIssue {
    /// 块起始步骤没有对应的结束标记
    UnclosedBlock { index: usize, step_id: String },

    /// 没有对应起始步骤的结束标记
    StrayTerminator { index: usize, step_id: String },

    /// 出现在条件块之外的 else-if / else
    StrayMidMarker { index: usize, step_id: String },

    /// 结束标记与起始步骤类型不一致
    MismatchedTerminator {
        index: usize,
        step_id: String,
        expected: String,
    },

    /// 配对标识与起始步骤不一致
    PairMismatch {
        index: usize,
        step_id: String,
        expected: String,
    },
}

impl fmt::Display for StructureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureIssue::UnclosedBlock { index, step_id } => {
                write!(f, "步骤 #{} ({}) 缺少结束标记", index, step_id)
            }
            StructureIssue::StrayTerminator { index, step_id } => {
                write!(f, "步骤 #{} ({}) 没有对应的块起始", index, step_id)
            }
            StructureIssue::StrayMidMarker { index, step_id } => {
                write!(f, "步骤 #{} ({}) 不在条件块内", index, step_id)
            }
            StructureIssue::MismatchedTerminator {
                index,
                step_id,
                expected,
            } => write!(f, "步骤 #{} ({}) 应为 {}", index, step_id, expected),
            StructureIssue::PairMismatch {
                index,
                step_id,
                expected,
            } => write!(
                f,
                "步骤 #{} ({}) 的配对标识应为 {}",
                index, step_id, expected
            ),
        }
    }
}

/// 检查步骤列表的块结构
///
/// 执行引擎不会修复结构问题，这里只做报告。
pub fn validate_structure(steps: &[Step]) -> Vec<StructureIssue> {
    let mut issues = Vec::new();
    // (下标, 期望的结束标记)
    let mut stack: Vec<(usize, BlockMarker)> = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if step.is_block_opener() {
            let expected = match step.kind {
                StepKind::While(_) => BlockMarker::EndWhile,
                StepKind::Loop(_) => BlockMarker::EndLoop,
                _ => BlockMarker::EndIf,
            };
            stack.push((index, expected));
            continue;
        }

        let Some(marker) = step.marker() else {
            continue;
        };

        if marker.is_mid_marker() {
            match stack.last() {
                Some((open, BlockMarker::EndIf)) => {
                    check_pair(steps, *open, index, &mut issues);
                }
                _ => issues.push(StructureIssue::StrayMidMarker {
                    index,
                    step_id: step.id.clone(),
                }),
            }
            continue;
        }

        match stack.pop() {
            Some((open, expected)) if expected == marker => {
                check_pair(steps, open, index, &mut issues);
            }
            // 仍然视为关闭了栈顶的块
            Some((_, expected)) => issues.push(StructureIssue::MismatchedTerminator {
                index,
                step_id: step.id.clone(),
                expected: marker_name(expected).to_string(),
            }),
            None => issues.push(StructureIssue::StrayTerminator {
                index,
                step_id: step.id.clone(),
            }),
        }
    }

    for (index, _) in stack {
        issues.push(StructureIssue::UnclosedBlock {
            index,
            step_id: steps[index].id.clone(),
        });
    }

    issues
}

fn check_pair(steps: &[Step], open: usize, index: usize, issues: &mut Vec<StructureIssue>) {
    let Some(expected) = steps[open].pair_id.as_ref() else {
        return;
    };
    if steps[index].pair_id.as_ref() != Some(expected) {
        issues.push(StructureIssue::PairMismatch {
            index,
            step_id: steps[index].id.clone(),
            expected: expected.clone(),
        });
    }
}

fn marker_name(marker: BlockMarker) -> &'static str {
    match marker {
        BlockMarker::ElseIf => "else-if",
        BlockMarker::Else => "else",
        BlockMarker::EndIf => "endif",
        BlockMarker::EndLoop => "end-loop",
        BlockMarker::EndWhile => "end-while",
    }
}
