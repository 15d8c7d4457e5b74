//! 场景执行引擎
//!
//! 在扁平步骤列表上按下标区间递归解释控制流。块边界全部通过
//! [`crate::block`] 解析，叶子动作交给动作执行器。

use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tapflow_common::{
    BlockMarker, CalcOperation, CalcVariableSpec, CountType, ErrorPolicy, LoopSpec, Operand,
    RunStatus, SetVariableSpec, Step, StepKind, ValueSource, VarValue,
};
use tapflow_protocol::ActionExecutor;

use crate::action::ActionRunner;
use crate::block::{find_block_end, find_else_in_block, find_paired_endif};
use crate::condition::{evaluate_conditions, outcome_to_bool};
use crate::config::{EngineConfig, WHILE_ITERATION_LIMIT};
use crate::progress::ProgressSink;
use crate::report::{ExecutionReport, StepReport, StepStatus};
use crate::variables::VariableStore;
use crate::{ExecutorError, Result, Scenario};

/// if / else-if 分支的结束标记
const BRANCH_MARKERS: &[BlockMarker] = &[BlockMarker::ElseIf, BlockMarker::Else, BlockMarker::EndIf];

/// 区间执行后的控制流
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// 区间正常执行完毕
    Continue,
    /// 控制终止步骤结束了整个运行
    Terminate {
        status: RunStatus,
        message: Option<String>,
    },
    /// 运行被取消
    Stopped,
}

/// 场景执行引擎
pub struct Engine {
    runner: ActionRunner,
    config: EngineConfig,
}

impl Engine {
    /// 创建新的执行引擎
    pub fn new(executor: Arc<dyn ActionExecutor>, config: EngineConfig) -> Self {
        let runner = ActionRunner::new(executor, config.action_timeout());
        Self { runner, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 执行场景
    ///
    /// 变量存储在开始时重置。致命错误以 FAIL 结束运行，不会向上传播。
    pub async fn run(
        &self,
        run_key: &str,
        scenario: &Scenario,
        variables: &mut VariableStore,
        token: CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> ExecutionReport {
        info!(scenario = %scenario.name, "开始执行场景 (执行器: {})", self.runner.executor_name());

        let start_time = Instant::now();
        let mut report = ExecutionReport::new(run_key, &scenario.name);
        report.description = scenario.description.clone();
        report.tags = scenario.tags.clone();

        variables.reset();

        let mut ctx = RunContext {
            steps: &scenario.steps,
            runner: &self.runner,
            config: &self.config,
            token,
            variables,
            progress,
            actions_count: 0,
            step_reports: Vec::new(),
        };

        let result = ctx.execute_range(0, scenario.steps.len()).await;

        let (status, message) = match result {
            // 最后一步的延迟期间被取消时，区间同样正常结束
            Ok(Flow::Continue) if ctx.token.is_cancelled() => {
                info!(scenario = %scenario.name, "场景已取消");
                (RunStatus::Stopped, None)
            }
            Ok(Flow::Continue) => (RunStatus::Pass, None),
            Ok(Flow::Terminate { status, message }) => (status, message),
            Ok(Flow::Stopped) => {
                info!(scenario = %scenario.name, "场景已取消");
                (RunStatus::Stopped, None)
            }
            Err(e) => {
                error!(scenario = %scenario.name, "场景执行失败: {}", e);
                (RunStatus::Fail, Some(e.to_string()))
            }
        };

        report.actions_count = ctx.actions_count;
        for step in std::mem::take(&mut ctx.step_reports) {
            report.add_step(step);
        }
        report.status = status;
        report.message = message;
        report.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            scenario = %scenario.name,
            "场景执行完成: {} (动作 {}, 成功 {}, 失败 {}, 耗时 {}ms)",
            report.status,
            report.actions_count,
            report.passed_count,
            report.failed_count,
            report.duration_ms
        );

        report
    }
}

/// 单次运行的执行上下文
struct RunContext<'a> {
    steps: &'a [Step],
    runner: &'a ActionRunner,
    config: &'a EngineConfig,
    token: CancellationToken,
    variables: &'a mut VariableStore,
    progress: Option<&'a dyn ProgressSink>,
    actions_count: u64,
    step_reports: Vec<StepReport>,
}

impl<'a> RunContext<'a> {
    /// 执行 `[start, end)` 区间
    fn execute_range(&mut self, start: usize, end: usize) -> BoxFuture<'_, Result<Flow>> {
        async move {
            let steps = self.steps;
            let end = end.min(steps.len());
            let mut i = start;

            while i < end {
                if self.token.is_cancelled() {
                    return Ok(Flow::Stopped);
                }

                let step = &steps[i];
                debug!(step_id = %step.id, index = i, "执行步骤 {}", step.kind.type_name());

                match &step.kind {
                    StepKind::If(group) | StepKind::ElseIf(group) => {
                        let branch_end = self.block_end(i, BRANCH_MARKERS)?;

                        if evaluate_conditions(self.runner, step, group, &mut *self.variables).await {
                            debug!(step_id = %step.id, "条件成立，执行分支 ({}, {})", i, branch_end);
                            let flow = self.execute_range(i + 1, branch_end).await?;
                            if flow != Flow::Continue {
                                return Ok(flow);
                            }
                            i = self.block_end(i, &[BlockMarker::EndIf])? + 1;
                        } else {
                            // 停在分支结束处，后续的 else-if / else 作为新的控制步骤处理
                            i = branch_end;
                        }
                    }

                    StepKind::Else => {
                        let endif = self.block_end(i, &[BlockMarker::EndIf])?;
                        let flow = self.execute_range(i + 1, endif).await?;
                        if flow != Flow::Continue {
                            return Ok(flow);
                        }
                        i = endif + 1;
                    }

                    StepKind::Endif | StepKind::EndLoop | StepKind::EndWhile => {
                        i += 1;
                    }

                    StepKind::While(group) => {
                        let loop_end = self.block_end(i, &[BlockMarker::EndWhile])?;
                        let mut iterations: u32 = 0;

                        loop {
                            if self.token.is_cancelled() {
                                return Ok(Flow::Stopped);
                            }
                            if iterations >= WHILE_ITERATION_LIMIT {
                                warn!(
                                    step_id = %step.id,
                                    "while 循环达到 {} 次上限，退出循环",
                                    WHILE_ITERATION_LIMIT
                                );
                                break;
                            }
                            if !evaluate_conditions(self.runner, step, group, &mut *self.variables).await
                            {
                                break;
                            }
                            iterations += 1;

                            let flow = self.execute_range(i + 1, loop_end).await?;
                            if flow != Flow::Continue {
                                return Ok(flow);
                            }
                        }

                        debug!(step_id = %step.id, "while 循环结束，共 {} 次", iterations);
                        i = loop_end + 1;
                    }

                    StepKind::Loop(spec) => {
                        let loop_end = self.block_end(i, &[BlockMarker::EndLoop])?;
                        let count = self.resolve_loop_count(step, spec)?;
                        debug!(step_id = %step.id, "计数循环 {} 次", count);

                        for _ in 0..count {
                            if self.token.is_cancelled() {
                                return Ok(Flow::Stopped);
                            }
                            let flow = self.execute_range(i + 1, loop_end).await?;
                            if flow != Flow::Continue {
                                return Ok(flow);
                            }
                        }

                        i = loop_end + 1;
                    }

                    StepKind::Success(termination)
                    | StepKind::Skip(termination)
                    | StepKind::Fail(termination) => {
                        let status = match step.kind {
                            StepKind::Success(_) => RunStatus::Pass,
                            StepKind::Skip(_) => RunStatus::Skip,
                            _ => RunStatus::Fail,
                        };
                        info!(
                            step_id = %step.id,
                            "终止步骤: {} {}",
                            status,
                            termination.message.as_deref().unwrap_or("")
                        );
                        return Ok(Flow::Terminate {
                            status,
                            message: termination.message.clone(),
                        });
                    }

                    StepKind::SetVariable(spec) => {
                        self.set_variable(i, step, spec);
                        self.finish_action().await;
                        i += 1;
                    }

                    StepKind::CalcVariable(spec) => {
                        self.calc_variable(i, step, spec)?;
                        self.finish_action().await;
                        i += 1;
                    }

                    _ if step.is_implicit_if() => {
                        let endif = find_paired_endif(steps, i).ok_or_else(|| {
                            ExecutorError::MalformedBlock {
                                index: i,
                                step_id: step.id.clone(),
                                expected: "endif".to_string(),
                            }
                        })?;
                        let else_index = find_else_in_block(steps, i, endif);

                        let matched = self.execute_leaf(i, step, true).await?;
                        self.finish_action().await;

                        let flow = if matched {
                            self.execute_range(i + 1, else_index.unwrap_or(endif)).await?
                        } else if let Some(else_index) = else_index {
                            self.execute_range(else_index + 1, endif).await?
                        } else {
                            Flow::Continue
                        };
                        if flow != Flow::Continue {
                            return Ok(flow);
                        }
                        i = endif + 1;
                    }

                    _ => {
                        self.execute_leaf(i, step, false).await?;
                        self.finish_action().await;
                        i += 1;
                    }
                }
            }

            Ok(Flow::Continue)
        }
        .boxed()
    }

    /// 查找块结束位置，找不到时视为致命的结构错误
    fn block_end(&self, index: usize, markers: &[BlockMarker]) -> Result<usize> {
        let end = find_block_end(self.steps, index, markers);
        if end >= self.steps.len() {
            let step = &self.steps[index];
            error!(step_id = %step.id, index, "块结构不完整，找不到结束标记");
            return Err(ExecutorError::MalformedBlock {
                index,
                step_id: step.id.clone(),
                expected: markers
                    .iter()
                    .map(|m| format!("{:?}", m))
                    .collect::<Vec<_>>()
                    .join("/"),
            });
        }
        Ok(end)
    }

    /// 解析循环次数
    fn resolve_loop_count(&self, step: &Step, spec: &LoopSpec) -> Result<u64> {
        if spec.count_type == CountType::Constant {
            return Ok(spec.count as u64);
        }

        let invalid = |reason: String| ExecutorError::InvalidLoopCount {
            step_id: step.id.clone(),
            reason,
        };

        let name = spec
            .variable
            .as_deref()
            .ok_or_else(|| invalid("未指定循环次数变量".to_string()))?;
        let value = self
            .variables
            .get(name)
            .ok_or_else(|| invalid(format!("变量 {} 不存在", name)))?;
        let count = value
            .as_number()
            .ok_or_else(|| invalid(format!("变量 {} 不是数字: {}", name, value)))?;

        if !count.is_finite() {
            return Err(invalid(format!("变量 {} 不是有限数值: {}", name, count)));
        }
        if count < 0.0 {
            return Err(invalid(format!("变量 {} 为负数: {}", name, count)));
        }
        if count > u32::MAX as f64 {
            return Err(invalid(format!("变量 {} 超出循环次数上限 {}: {}", name, u32::MAX, count)));
        }

        Ok(count.floor() as u64)
    }

    /// 执行叶子动作，返回推导出的布尔值
    ///
    /// 作为隐式 if 执行时，动作返回失败只表示条件不成立。
    async fn execute_leaf(&mut self, index: usize, step: &Step, as_condition: bool) -> Result<bool> {
        let started = Instant::now();
        let result = self.runner.run(step).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                self.variables.set_last_action_result(outcome.primary_value());
                let value = outcome_to_bool(step, &outcome);

                if as_condition {
                    debug!(step_id = %step.id, "隐式条件 {} 结果: {}", step.kind.type_name(), value);
                    self.step_reports.push(
                        StepReport::success(index, &step.id, step.kind.type_name(), step.label())
                            .with_duration(elapsed)
                            .with_output(format!("条件结果: {}", value)),
                    );
                } else if outcome.success {
                    debug!(step_id = %step.id, "动作 {} 执行成功", step.kind.type_name());
                    self.record_success(index, step, elapsed);
                } else {
                    let reason = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "动作返回失败".to_string());
                    self.handle_step_failure(index, step, &reason, elapsed)?;
                }
                Ok(value)
            }
            Err(e) => {
                self.variables.set_last_action_result(VarValue::Bool(false));
                self.handle_step_failure(index, step, &e.to_string(), elapsed)?;
                Ok(false)
            }
        }
    }

    fn set_variable(&mut self, index: usize, step: &Step, spec: &SetVariableSpec) {
        let value = match spec.source {
            ValueSource::Previous => match self.variables.last_action_result() {
                Some(value) => value.clone(),
                None => {
                    warn!(step_id = %step.id, "没有上一个动作结果，变量 {} 设为 0", spec.name);
                    VarValue::Number(0.0)
                }
            },
            ValueSource::Constant => match &spec.value {
                Some(value) => value.clone(),
                None => {
                    warn!(step_id = %step.id, "未指定常量值，变量 {} 设为 0", spec.name);
                    VarValue::Number(0.0)
                }
            },
        };

        debug!(step_id = %step.id, "设置变量 {} = {}", spec.name, value);
        self.variables.set(spec.name.clone(), value.clone());
        self.variables.set_last_action_result(value);
        self.record_success(index, step, 0);
    }

    fn calc_variable(&mut self, index: usize, step: &Step, spec: &CalcVariableSpec) -> Result<()> {
        match self.compute(step, spec) {
            Ok(result) => {
                debug!(
                    step_id = %step.id,
                    "计算变量 {} = {} ({})",
                    spec.target,
                    result,
                    spec.operation
                );
                let value = VarValue::Number(result);
                self.variables.set(spec.target.clone(), value.clone());
                self.variables.set_last_action_result(value);
                self.record_success(index, step, 0);
                Ok(())
            }
            Err(e) => self.handle_step_failure(index, step, &e.to_string(), 0),
        }
    }

    fn compute(&self, step: &Step, spec: &CalcVariableSpec) -> Result<f64> {
        let left = self.resolve_operand(&spec.operand1)?;
        let right = self.resolve_operand(&spec.operand2)?;

        match spec.operation {
            CalcOperation::Add => Ok(left + right),
            CalcOperation::Subtract => Ok(left - right),
            CalcOperation::Multiply => Ok(left * right),
            CalcOperation::Divide if right == 0.0 => Err(ExecutorError::DivisionByZero {
                step_id: step.id.clone(),
            }),
            CalcOperation::Divide => Ok(left / right),
        }
    }

    fn resolve_operand(&self, operand: &Operand) -> Result<f64> {
        match operand {
            Operand::Constant { value } => Ok(*value),
            Operand::Variable { name } => self
                .variables
                .number(name)
                .ok_or_else(|| ExecutorError::VariableNotFound(name.clone())),
        }
    }

    fn record_success(&mut self, index: usize, step: &Step, elapsed_ms: u64) {
        self.step_reports.push(
            StepReport::success(index, &step.id, step.kind.type_name(), step.label())
                .with_duration(elapsed_ms),
        );
    }

    /// 处理可恢复的步骤失败
    ///
    /// 默认记录日志后继续，`stop` 升级为致命错误，`skip` 不记录日志。
    fn handle_step_failure(
        &mut self,
        index: usize,
        step: &Step,
        reason: &str,
        elapsed_ms: u64,
    ) -> Result<()> {
        let report = StepReport::failed(index, &step.id, step.kind.type_name(), step.label(), reason)
            .with_duration(elapsed_ms);

        match step.on_error {
            ErrorPolicy::Continue => {
                warn!(step_id = %step.id, index, "步骤 {} 执行失败: {}", step.label(), reason);
                self.step_reports.push(report);
                Ok(())
            }
            ErrorPolicy::Skip => {
                self.step_reports.push(report.with_status(StepStatus::Skipped));
                Ok(())
            }
            ErrorPolicy::Stop => {
                error!(step_id = %step.id, index, "步骤 {} 执行失败，终止运行: {}", step.label(), reason);
                self.step_reports.push(report);
                Err(ExecutorError::StepExecutionFailed(format!(
                    "{}: {}",
                    step.label(),
                    reason
                )))
            }
        }
    }

    /// 动作计数、上报进度并等待步骤间延迟
    async fn finish_action(&mut self) {
        self.actions_count += 1;
        if let Some(progress) = self.progress {
            progress.on_action(self.actions_count).await;
        }

        let delay = self.config.step_delay();
        if delay.is_zero() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.token.cancelled() => {
                debug!("步骤间延迟被取消打断");
            }
        }
    }
}
