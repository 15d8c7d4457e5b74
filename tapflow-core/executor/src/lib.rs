//! TapFlow 执行器
//!
//! 场景解释执行引擎: 块结构解析、条件求值、变量存储、
//! 运行控制 (取消、进度) 与执行报告。

pub mod action;
pub mod block;
pub mod condition;
pub mod config;
pub mod controller;
pub mod engine;
pub mod progress;
pub mod report;
pub mod scenario;
pub mod variables;

pub use action::ActionRunner;
pub use block::{
    find_block_end, find_else_in_block, find_paired_endif, validate_structure, StructureIssue,
};
pub use condition::{evaluate_comparison, evaluate_conditions, outcome_to_bool};
pub use config::{EngineConfig, WHILE_ITERATION_LIMIT};
pub use controller::{RunController, TrackedRun};
pub use engine::{Engine, Flow};
pub use progress::{estimate_total, ProgressSink};
pub use report::{BatchReport, ExecutionReport, StepReport, StepStatus};
pub use scenario::{matches_pattern, Scenario};
pub use variables::VariableStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("场景加载失败: {0}")]
    ScenarioLoadFailed(String),

    #[error("步骤执行失败: {0}")]
    StepExecutionFailed(String),

    #[error("块结构错误: 步骤 #{index} ({step_id}) 找不到 {expected}")]
    MalformedBlock {
        index: usize,
        step_id: String,
        expected: String,
    },

    #[error("循环次数无效: 步骤 {step_id}: {reason}")]
    InvalidLoopCount { step_id: String, reason: String },

    #[error("除数为零: 步骤 {step_id}")]
    DivisionByZero { step_id: String },

    #[error("变量不存在或不是数字: {0}")]
    VariableNotFound(String),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
