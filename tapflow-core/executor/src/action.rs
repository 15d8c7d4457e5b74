//! 动作调用封装

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use tapflow_common::Step;
use tapflow_protocol::{ActionExecutor, ActionOutcome, ProtocolError};

/// 带可选超时的动作执行器句柄
#[derive(Clone)]
pub struct ActionRunner {
    executor: Arc<dyn ActionExecutor>,
    timeout: Option<Duration>,
}

impl ActionRunner {
    pub fn new(executor: Arc<dyn ActionExecutor>, timeout: Option<Duration>) -> Self {
        Self { executor, timeout }
    }

    /// 执行动作
    pub async fn run(&self, step: &Step) -> tapflow_protocol::Result<ActionOutcome> {
        match self.timeout {
            Some(limit) => timeout(limit, self.executor.execute(step))
                .await
                .map_err(|_| ProtocolError::Timeout)?,
            None => self.executor.execute(step).await,
        }
    }

    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }
}
