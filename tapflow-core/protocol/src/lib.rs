//! TapFlow 协议层
//!
//! 提供动作执行的统一抽象接口，以及基于设备能力组合的执行器和演练执行器。

pub mod device;
pub mod dry_run;
pub mod outcome;
pub mod traits;

pub use device::DeviceActionExecutor;
pub use dry_run::{DryRunExecutor, DryRunProfile};
pub use outcome::{ActionOutcome, MatchedPoint};
pub use traits::{
    ActionExecutor, AudioCapture, ImageMatcher, InputDevice, MatchOptions, MatchResult,
    Screenshot, SoundMatcher,
};

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("不支持的动作类型: {0}")]
    UnsupportedAction(String),

    #[error("设备操作失败: {0}")]
    DeviceError(String),

    #[error("图像匹配失败: {0}")]
    MatchFailed(String),

    #[error("音频采集失败: {0}")]
    AudioError(String),

    #[error("参数错误: {0}")]
    InvalidParams(String),

    #[error("超时")]
    Timeout,

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
