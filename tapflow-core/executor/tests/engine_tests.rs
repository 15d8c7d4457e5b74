//! 执行引擎测试

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tapflow_common::{
    CalcOperation, CalcVariableSpec, Condition, ConditionGroup, ErrorPolicy, ImageMatchSpec,
    LogicOperator, LoopSpec, Operand, RunStatus, SetVariableSpec, StepKind, Termination,
    ValueSource, VarValue, VolumeSpec,
};
use tapflow_executor::*;

async fn run_with(
    executor: Arc<RecordingExecutor>,
    steps: Vec<tapflow_common::Step>,
    token: CancellationToken,
) -> (ExecutionReport, VariableStore) {
    init_tracing();
    let engine = Engine::new(executor, EngineConfig::immediate());
    let scenario = Scenario::new("test", steps);
    let mut variables = VariableStore::new();
    let report = engine
        .run("key", &scenario, &mut variables, token, None)
        .await;
    (report, variables)
}

async fn run(
    executor: Arc<RecordingExecutor>,
    steps: Vec<tapflow_common::Step>,
) -> (ExecutionReport, VariableStore) {
    run_with(executor, steps, CancellationToken::new()).await
}

fn image(template: &str) -> StepKind {
    StepKind::ImageMatch(ImageMatchSpec {
        template: template.to_string(),
        threshold: 0.8,
        region: None,
        color_invariant: false,
    })
}

fn set_const(id: &str, name: &str, value: f64) -> tapflow_common::Step {
    step(
        id,
        StepKind::SetVariable(SetVariableSpec {
            name: name.to_string(),
            source: ValueSource::Constant,
            value: Some(VarValue::Number(value)),
        }),
    )
}

#[tokio::test]
async fn test_if_true_skips_else() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("if", StepKind::If(group(&["yes"], LogicOperator::And))),
        tap("t1", 10, 10),
        step("else", StepKind::Else),
        tap("t2", 20, 20),
        step("endif", StepKind::Endif),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(executor.taps(), vec![(10, 10)]);
}

#[tokio::test]
async fn test_else_if_chain() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("if", StepKind::If(group(&["no"], LogicOperator::And))),
        tap("t1", 1, 1),
        step("elif1", StepKind::ElseIf(group(&["no", "yes"], LogicOperator::And))),
        tap("t2", 2, 2),
        step("elif2", StepKind::ElseIf(group(&["no", "yes"], LogicOperator::Or))),
        tap("t3", 3, 3),
        step("else", StepKind::Else),
        tap("t4", 4, 4),
        step("endif", StepKind::Endif),
        tap("after", 5, 5),
    ];

    let (_, _) = run(executor.clone(), steps).await;
    assert_eq!(executor.taps(), vec![(3, 3), (5, 5)]);
}

#[tokio::test]
async fn test_all_false_runs_else() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("if", StepKind::If(group(&["no"], LogicOperator::And))),
        tap("t1", 1, 1),
        step("elif", StepKind::ElseIf(group(&[], LogicOperator::Or))),
        tap("t2", 2, 2),
        step("else", StepKind::Else),
        tap("t3", 3, 3),
        step("endif", StepKind::Endif),
    ];

    run(executor.clone(), steps).await;
    assert_eq!(executor.taps(), vec![(3, 3)]);
}

#[tokio::test]
async fn test_nested_if_inside_false_branch_is_skipped() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("outer", StepKind::If(group(&["no"], LogicOperator::And))),
        step("inner", StepKind::If(group(&["yes"], LogicOperator::And))),
        tap("t1", 1, 1),
        step("inner-else", StepKind::Else),
        tap("t2", 2, 2),
        step("inner-end", StepKind::Endif),
        step("outer-else", StepKind::Else),
        tap("t3", 3, 3),
        step("outer-end", StepKind::Endif),
    ];

    run(executor.clone(), steps).await;
    assert_eq!(executor.taps(), vec![(3, 3)]);
}

#[tokio::test]
async fn test_constant_loop() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("loop", StepKind::Loop(LoopSpec::times(3))),
        step("wait", StepKind::Wait { duration_ms: 100 }),
        step("end", StepKind::EndLoop),
    ];
    assert_eq!(estimate_total(&steps), Some(3));

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(executor.count("wait"), 3);
    assert_eq!(report.actions_count, 3);
}

#[tokio::test]
async fn test_variable_loop_floors_count() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        set_const("set", "n", 2.7),
        step("loop", StepKind::Loop(LoopSpec::from_variable("n"))),
        tap("t", 1, 1),
        step("end", StepKind::EndLoop),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(executor.taps().len(), 2);
}

#[tokio::test]
async fn test_variable_loop_zero_runs_nothing() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        set_const("set", "n", 0.0),
        step("loop", StepKind::Loop(LoopSpec::from_variable("n"))),
        tap("t", 1, 1),
        step("end", StepKind::EndLoop),
        tap("after", 2, 2),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(executor.taps(), vec![(2, 2)]);
}

#[tokio::test]
async fn test_variable_loop_missing_is_fatal() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("loop", StepKind::Loop(LoopSpec::from_variable("missing"))),
        tap("t", 1, 1),
        step("end", StepKind::EndLoop),
        tap("after", 2, 2),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert!(report.message.unwrap().contains("missing"));
    assert!(executor.taps().is_empty());
}

#[tokio::test]
async fn test_variable_loop_negative_is_fatal() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        set_const("set", "n", -1.0),
        step("loop", StepKind::Loop(LoopSpec::from_variable("n"))),
        tap("t", 1, 1),
        step("end", StepKind::EndLoop),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert!(executor.taps().is_empty());
}

#[tokio::test]
async fn test_variable_loop_count_too_large_is_fatal() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        set_const("set", "n", 1e300),
        step("loop", StepKind::Loop(LoopSpec::from_variable("n"))),
        tap("t", 1, 1),
        step("end", StepKind::EndLoop),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert!(report.message.unwrap().contains("循环次数无效"));
    assert!(executor.taps().is_empty());
}

#[tokio::test]
async fn test_while_runs_until_condition_false() {
    let executor = Arc::new(RecordingExecutor::new().with_countdown(3));
    let steps = vec![
        step("while", StepKind::While(group(&["countdown"], LogicOperator::And))),
        tap("t", 1, 1),
        step("end", StepKind::EndWhile),
    ];
    assert_eq!(estimate_total(&steps), None);

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(executor.taps().len(), 3);
}

#[tokio::test]
async fn test_while_iteration_limit() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("while", StepKind::While(group(&["yes"], LogicOperator::And))),
        tap("t", 1, 1),
        step("end", StepKind::EndWhile),
        tap("after", 9, 9),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    let taps = executor.taps();
    assert_eq!(taps.len(), WHILE_ITERATION_LIMIT as usize + 1);
    assert_eq!(taps.last(), Some(&(9, 9)));
}

#[tokio::test]
async fn test_calc_division_by_zero_keeps_target() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        set_const("set", "x", 5.0),
        step(
            "calc",
            StepKind::CalcVariable(CalcVariableSpec {
                target: "x".to_string(),
                operand1: Operand::Variable {
                    name: "x".to_string(),
                },
                operation: CalcOperation::Divide,
                operand2: Operand::Constant { value: 0.0 },
            }),
        ),
        tap("after", 1, 1),
    ];

    let (report, variables) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(report.failed_count, 1);
    assert_eq!(variables.number("x"), Some(5.0));
    assert_eq!(executor.taps(), vec![(1, 1)]);
}

#[tokio::test]
async fn test_calc_and_previous_result() {
    let executor = Arc::new(RecordingExecutor::new().with_volume(40.0));
    let steps = vec![
        step(
            "vol",
            StepKind::GetVolume(VolumeSpec {
                device_id: None,
                duration_ms: 100,
                operator: ">=".to_string(),
                value: None,
            }),
        ),
        step(
            "save",
            StepKind::SetVariable(SetVariableSpec {
                name: "v".to_string(),
                source: ValueSource::Previous,
                value: None,
            }),
        ),
        step(
            "calc",
            StepKind::CalcVariable(CalcVariableSpec {
                target: "double".to_string(),
                operand1: Operand::Variable {
                    name: "v".to_string(),
                },
                operation: CalcOperation::Multiply,
                operand2: Operand::Constant { value: 2.0 },
            }),
        ),
    ];

    let (report, variables) = run(executor, steps).await;
    assert_eq!(report.actions_count, 3);
    assert_eq!(variables.number("v"), Some(40.0));
    assert_eq!(variables.number("double"), Some(80.0));
    assert_eq!(
        variables.last_action_result(),
        Some(&VarValue::Number(80.0))
    );
}

#[tokio::test]
async fn test_executor_error_replaces_previous_result() {
    let executor = Arc::new(RecordingExecutor::new().with_volume(40.0).erroring("vol2"));
    let volume = |id: &str| {
        step(
            id,
            StepKind::GetVolume(VolumeSpec {
                device_id: None,
                duration_ms: 100,
                operator: ">=".to_string(),
                value: None,
            }),
        )
    };
    let steps = vec![
        volume("vol1"),
        volume("vol2"),
        step(
            "save",
            StepKind::SetVariable(SetVariableSpec {
                name: "v".to_string(),
                source: ValueSource::Previous,
                value: None,
            }),
        ),
    ];

    let (report, variables) = run(executor, steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(report.failed_count, 1);
    // 出错的动作结果为 false，而不是 vol1 的 40 dB
    assert_eq!(variables.get("v"), Some(&VarValue::Bool(false)));
    assert_eq!(variables.number("v"), Some(0.0));
}

#[tokio::test]
async fn test_previous_without_result_defaults_to_zero() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![step(
        "save",
        StepKind::SetVariable(SetVariableSpec {
            name: "v".to_string(),
            source: ValueSource::Previous,
            value: None,
        }),
    )];

    let (_, variables) = run(executor, steps).await;
    assert_eq!(variables.number("v"), Some(0.0));
}

#[tokio::test]
async fn test_fail_inside_loop_ends_run() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("loop", StepKind::Loop(LoopSpec::times(5))),
        tap("t", 1, 1),
        step("fail", StepKind::Fail(Termination::with_message("按钮消失"))),
        step("end", StepKind::EndLoop),
        tap("after", 2, 2),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert_eq!(report.message.as_deref(), Some("按钮消失"));
    assert_eq!(executor.taps(), vec![(1, 1)]);
}

#[tokio::test]
async fn test_success_and_skip_terminators() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("if", StepKind::If(group(&["yes"], LogicOperator::And))),
        step("skip", StepKind::Skip(Termination::default())),
        step("endif", StepKind::Endif),
        tap("after", 1, 1),
    ];
    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Skip);
    assert!(executor.taps().is_empty());

    let steps = vec![
        step("ok", StepKind::Success(Termination::default())),
        tap("after", 1, 1),
    ];
    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert!(executor.taps().is_empty());
}

#[tokio::test]
async fn test_leaf_failure_continues() {
    let executor = Arc::new(RecordingExecutor::new().failing("t1").erroring("t2"));
    let steps = vec![tap("t1", 1, 1), tap("t2", 2, 2), tap("t3", 3, 3)];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(report.failed_count, 2);
    assert_eq!(report.passed_count, 1);
    assert_eq!(executor.taps().len(), 3);
}

#[tokio::test]
async fn test_on_error_policies() {
    let executor = Arc::new(RecordingExecutor::new().failing("t1").failing("t2"));
    let steps = vec![
        tap("t1", 1, 1).with_on_error(ErrorPolicy::Skip),
        tap("t2", 2, 2).with_on_error(ErrorPolicy::Stop),
        tap("t3", 3, 3),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert_eq!(report.steps[0].status, StepStatus::Skipped);
    assert_eq!(report.steps[1].status, StepStatus::Failed);
    assert_eq!(executor.taps().len(), 2);
}

#[tokio::test]
async fn test_implicit_if_with_else() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("match", image("no")).with_pair("p1"),
        tap("t1", 1, 1),
        step("else", StepKind::Else).with_pair("p1"),
        tap("t2", 2, 2),
        step("endif", StepKind::Endif).with_pair("p1"),
        step("match2", image("yes")).with_pair("p2"),
        tap("t3", 3, 3),
        step("else2", StepKind::Else).with_pair("p2"),
        tap("t4", 4, 4),
        step("endif2", StepKind::Endif).with_pair("p2"),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Pass);
    assert_eq!(report.failed_count, 0);
    assert_eq!(executor.taps(), vec![(2, 2), (3, 3)]);

    let output = |id: &str| {
        report
            .steps
            .iter()
            .find(|s| s.step_id == id)
            .and_then(|s| s.output.clone())
    };
    assert_eq!(output("match").as_deref(), Some("条件结果: false"));
    assert_eq!(output("match2").as_deref(), Some("条件结果: true"));
}

#[tokio::test]
async fn test_implicit_if_volume_comparison() {
    let executor = Arc::new(RecordingExecutor::new().with_volume(72.0));
    let volume = |id: &str, operator: &str, value: f64| {
        step(
            id,
            StepKind::GetVolume(VolumeSpec {
                device_id: None,
                duration_ms: 100,
                operator: operator.to_string(),
                value: Some(value),
            }),
        )
    };
    let steps = vec![
        volume("loud", ">", 70.0).with_pair("p1"),
        tap("t1", 1, 1),
        step("endif", StepKind::Endif).with_pair("p1"),
        volume("quiet", "<", 30.0).with_pair("p2"),
        tap("t2", 2, 2),
        step("endif2", StepKind::Endif).with_pair("p2"),
    ];

    run(executor.clone(), steps).await;
    assert_eq!(executor.taps(), vec![(1, 1)]);
}

#[tokio::test]
async fn test_negated_condition_from_params() {
    let executor = Arc::new(RecordingExecutor::new());
    let group = ConditionGroup::new(
        vec![
            Condition::new("image-match", json!({ "template": "no" })).negated(),
            Condition::new("sound-check", json!({ "reference": "a.wav", "threshold": 0.4 })),
        ],
        LogicOperator::And,
    );
    let steps = vec![
        step("if", StepKind::If(group)),
        tap("t1", 1, 1),
        step("endif", StepKind::Endif),
    ];

    run(executor.clone(), steps).await;
    assert_eq!(executor.taps(), vec![(1, 1)]);
}

#[tokio::test]
async fn test_unclosed_block_is_fatal() {
    let executor = Arc::new(RecordingExecutor::new());
    let steps = vec![
        step("if", StepKind::If(group(&["yes"], LogicOperator::And))),
        tap("t1", 1, 1),
    ];

    let (report, _) = run(executor.clone(), steps).await;
    assert_eq!(report.status, RunStatus::Fail);
    assert!(executor.taps().is_empty());
}

#[tokio::test]
async fn test_stop_after_second_step() {
    let token = CancellationToken::new();
    let executor = Arc::new(RecordingExecutor::new().cancel_after_taps(2, token.clone()));
    let steps = (1..=5).map(|n| tap(&format!("t{}", n), n, n)).collect();

    let (report, _) = run_with(executor.clone(), steps, token).await;
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.actions_count, 2);
    assert_eq!(executor.taps(), vec![(1, 1), (2, 2)]);
}

#[tokio::test]
async fn test_cancel_interrupts_step_delay() {
    let token = CancellationToken::new();
    let executor = Arc::new(RecordingExecutor::new().cancel_after_taps(1, token.clone()));
    let engine = Engine::new(
        executor.clone(),
        EngineConfig {
            step_delay_ms: 60_000,
            default_action_timeout_secs: 0,
        },
    );
    let scenario = Scenario::new("slow", vec![tap("t1", 1, 1), tap("t2", 2, 2)]);
    let mut variables = VariableStore::new();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run("key", &scenario, &mut variables, token, None),
    )
    .await
    .expect("延迟应被取消打断");

    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(executor.taps().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_last_action_is_stopped() {
    let token = CancellationToken::new();
    let executor = Arc::new(RecordingExecutor::new().cancel_after_taps(2, token.clone()));
    let steps = vec![tap("t1", 1, 1), tap("t2", 2, 2)];

    let (report, _) = run_with(executor.clone(), steps, token).await;
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.summary().status, RunStatus::Stopped);
    assert_eq!(executor.taps().len(), 2);
}

#[tokio::test]
async fn test_variables_reset_between_runs() {
    let executor = Arc::new(RecordingExecutor::new());
    let engine = Engine::new(executor, EngineConfig::immediate());
    let mut variables = VariableStore::new();
    variables.set("stale", VarValue::Bool(true));

    let scenario = Scenario::new("vars", vec![set_const("set", "fresh", 1.0)]);
    engine
        .run("key", &scenario, &mut variables, CancellationToken::new(), None)
        .await;

    assert!(!variables.contains("stale"));
    assert_eq!(variables.number("fresh"), Some(1.0));
}
