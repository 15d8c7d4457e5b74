//! TapFlow 通用类型定义
//!
//! 此 crate 包含协议层、执行器和 CLI 之间共享的类型：
//! - 场景步骤模型 ([`Step`], [`StepKind`], [`Condition`])
//! - 运行状态与进度 ([`RunStatus`], [`RunProgress`], [`RunSnapshot`], [`RunSummary`])

pub mod status;
pub mod step;

pub use status::{RunProgress, RunSnapshot, RunStatus, RunSummary};
pub use step::{
    BlockMarker, CalcOperation, CalcVariableSpec, Condition, ConditionGroup, CountType,
    ErrorPolicy, ImageMatchSpec, KeyboardSpec, LogicOperator, LoopSpec, Operand, Region,
    SetVariableSpec, SoundCheckSpec, Step, StepCategory, StepKind, Termination, ValueSource,
    VarValue, VolumeSpec,
};
