//! 条件求值
//!
//! 每个条件先构造成临时动作步骤交给动作执行器，再从执行结果推导布尔值。
//! 一个条件组只有一个组合运算符，不支持 AND / OR 混合。

use tracing::{debug, warn};

use tapflow_common::{ConditionGroup, LogicOperator, Step, StepKind, VarValue};
use tapflow_protocol::ActionOutcome;

use crate::action::ActionRunner;
use crate::variables::VariableStore;

/// 数值比较
///
/// 支持 `>= <= > < == === != !==`，未知运算符返回 None。
pub fn evaluate_comparison(actual: f64, operator: &str, expected: f64) -> Option<bool> {
    let result = match operator.trim() {
        ">=" => actual >= expected,
        "<=" => actual <= expected,
        ">" => actual > expected,
        "<" => actual < expected,
        "==" | "===" => (actual - expected).abs() < f64::EPSILON,
        "!=" | "!==" => (actual - expected).abs() >= f64::EPSILON,
        _ => return None,
    };
    Some(result)
}

/// 从动作结果推导布尔值
///
/// get-volume 比较音量，sound-check 比较相似度，其余动作直接使用成功标志。
/// 缺少比较基准或测量值、运算符未知时返回 false。
pub fn outcome_to_bool(step: &Step, outcome: &ActionOutcome) -> bool {
    let (measured, operator, expected) = match &step.kind {
        StepKind::GetVolume(spec) => (outcome.volume, &spec.operator, spec.value),
        StepKind::SoundCheck(spec) => (outcome.similarity, &spec.operator, spec.threshold),
        _ => return outcome.success,
    };

    let (Some(measured), Some(expected)) = (measured, expected) else {
        debug!(step_id = %step.id, "缺少测量值或比较基准，按 false 处理");
        return false;
    };

    evaluate_comparison(measured, operator, expected).unwrap_or_else(|| {
        warn!(step_id = %step.id, "未知的比较运算符: {}，按 false 处理", operator);
        false
    })
}

/// 执行单个条件探测，返回推导出的布尔值 (未取反)
///
/// 探测结果会写入 `last_action_result`。
pub async fn run_condition_step(
    runner: &ActionRunner,
    condition_step: &Step,
    variables: &mut VariableStore,
) -> bool {
    match runner.run(condition_step).await {
        Ok(outcome) => {
            variables.set_last_action_result(outcome.primary_value());
            let value = outcome_to_bool(condition_step, &outcome);
            debug!(
                "条件探测 {} ({}) 结果: {}",
                condition_step.kind.type_name(),
                condition_step.id,
                value
            );
            value
        }
        Err(e) => {
            variables.set_last_action_result(VarValue::Bool(false));
            warn!(
                step_id = %condition_step.id,
                "条件探测 {} 执行失败: {}，按 false 处理",
                condition_step.kind.type_name(),
                e
            );
            false
        }
    }
}

/// 求值条件组
///
/// 空条件组返回 false。所有条件都会被执行，结果按组合运算符合并。
pub async fn evaluate_conditions(
    runner: &ActionRunner,
    owner: &Step,
    group: &ConditionGroup,
    variables: &mut VariableStore,
) -> bool {
    if group.conditions.is_empty() {
        debug!(step_id = %owner.id, "条件列表为空，按 false 处理");
        return false;
    }

    let mut results = Vec::with_capacity(group.conditions.len());

    for (index, condition) in group.conditions.iter().enumerate() {
        let value = match condition.to_step_kind() {
            Ok(kind) => {
                let condition_step = Step::new(format!("{}#cond{}", owner.id, index), kind);
                run_condition_step(runner, &condition_step, variables).await
            }
            Err(e) => {
                warn!(
                    step_id = %owner.id,
                    "条件 #{} ({}) 参数无效: {}，按 false 处理",
                    index,
                    condition.action_type,
                    e
                );
                false
            }
        };

        results.push(value != condition.negate);
    }

    let combined = combine(&results, group.condition_operator);
    debug!(
        step_id = %owner.id,
        "条件组 {:?} {:?} => {}",
        group.condition_operator,
        results,
        combined
    );
    combined
}

/// 按单一运算符合并
pub fn combine(results: &[bool], operator: LogicOperator) -> bool {
    if results.is_empty() {
        return false;
    }
    match operator {
        LogicOperator::And => results.iter().all(|v| *v),
        LogicOperator::Or => results.iter().any(|v| *v),
    }
}
