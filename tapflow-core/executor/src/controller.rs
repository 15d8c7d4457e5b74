//! 场景运行控制器
//!
//! 管理正在执行的运行 (状态、进度、取消令牌)，并把运行快照推送给观察者。
//! 批量执行严格串行，一个场景结束后才开始下一个。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tapflow_common::{RunProgress, RunSnapshot, RunStatus};
use tapflow_protocol::ActionExecutor;

use crate::engine::Engine;
use crate::progress::{estimate_total, ProgressSink};
use crate::report::{BatchReport, ExecutionReport};
use crate::variables::VariableStore;
use crate::{EngineConfig, Scenario};

/// 被跟踪的运行
#[derive(Debug, Clone)]
pub struct TrackedRun {
    /// 场景名称
    pub scenario_name: String,

    /// 当前状态
    pub status: RunStatus,

    /// 当前进度
    pub progress: RunProgress,

    token: CancellationToken,
}

type RunRegistry = Arc<RwLock<HashMap<String, TrackedRun>>>;

/// 场景运行控制器
pub struct RunController {
    /// 执行引擎
    engine: Arc<Engine>,

    /// 正在执行的运行 (运行键 -> 运行记录)
    runs: RunRegistry,

    /// 快照推送通道
    events: Option<mpsc::UnboundedSender<RunSnapshot>>,

    /// 当前批量执行的取消令牌
    batch_token: Mutex<Option<CancellationToken>>,
}

impl RunController {
    /// 创建新的运行控制器
    pub fn new(executor: Arc<dyn ActionExecutor>, config: EngineConfig) -> Self {
        Self {
            engine: Arc::new(Engine::new(executor, config)),
            runs: Arc::new(RwLock::new(HashMap::new())),
            events: None,
            batch_token: Mutex::new(None),
        }
    }

    /// 设置快照推送通道
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<RunSnapshot>) -> Self {
        self.events = Some(sender);
        self
    }

    /// 创建控制器并返回快照接收端
    pub fn with_channel(
        executor: Arc<dyn ActionExecutor>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RunSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(executor, config).with_events(tx), rx)
    }

    /// 生成新的运行键
    pub fn new_run_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// 执行单个场景
    pub async fn run_scenario(&self, scenario: &Scenario) -> ExecutionReport {
        let key = Self::new_run_key();
        self.run_scenario_with_key(&key, scenario).await
    }

    /// 使用指定运行键执行场景 (调用方可在执行期间按键取消)
    pub async fn run_scenario_with_key(&self, key: &str, scenario: &Scenario) -> ExecutionReport {
        self.execute(key, scenario, CancellationToken::new()).await
    }

    /// 串行执行一批场景
    ///
    /// 批量取消后，当前场景停止，剩余场景直接记为 STOPPED。
    pub async fn run_batch(&self, scenarios: &[Scenario]) -> BatchReport {
        let batch_token = CancellationToken::new();
        *self.batch_token.lock().await = Some(batch_token.clone());

        info!("开始批量执行 {} 个场景", scenarios.len());
        let start_time = Instant::now();
        let mut batch = BatchReport::new();

        for (index, scenario) in scenarios.iter().enumerate() {
            let key = Self::new_run_key();

            if batch_token.is_cancelled() {
                debug!("批量执行已取消，跳过场景 {}", scenario.name);
                batch.add_report(ExecutionReport::stopped(&key, &scenario.name));
                continue;
            }

            info!("[{}/{}] 执行场景: {}", index + 1, scenarios.len(), scenario.name);
            let report = self
                .execute(&key, scenario, batch_token.child_token())
                .await;
            batch.add_report(report);
        }

        *self.batch_token.lock().await = None;
        batch.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "批量执行完成: 总计 {}, 通过 {}, 失败 {}, 跳过 {}, 取消 {}",
            batch.total, batch.passed, batch.failed, batch.skipped, batch.stopped
        );
        batch
    }

    /// 取消批量执行
    pub async fn cancel_batch(&self) -> bool {
        match self.batch_token.lock().await.as_ref() {
            Some(token) => {
                info!("取消批量执行");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消运行并从跟踪列表移除
    pub async fn cancel(&self, key: &str) -> bool {
        let removed = self.runs.write().await.remove(key);

        match removed {
            Some(run) => {
                info!("取消运行: {} ({})", key, run.scenario_name);
                run.token.cancel();
                emit(
                    &self.events,
                    RunSnapshot {
                        scenario_key: key.to_string(),
                        status: RunStatus::Stopped,
                        progress: run.progress,
                    },
                );
                true
            }
            None => {
                warn!("运行 {} 不存在或已结束", key);
                false
            }
        }
    }

    /// 查询运行状态
    pub async fn get(&self, key: &str) -> Option<TrackedRun> {
        self.runs.read().await.get(key).cloned()
    }

    /// 列出正在执行的运行键
    pub async fn list(&self) -> Vec<String> {
        self.runs.read().await.keys().cloned().collect()
    }

    async fn execute(
        &self,
        key: &str,
        scenario: &Scenario,
        token: CancellationToken,
    ) -> ExecutionReport {
        let total = estimate_total(&scenario.steps);
        let progress = RunProgress::new(total);

        self.runs.write().await.insert(
            key.to_string(),
            TrackedRun {
                scenario_name: scenario.name.clone(),
                status: RunStatus::Running,
                progress,
                token: token.clone(),
            },
        );
        emit(
            &self.events,
            RunSnapshot {
                scenario_key: key.to_string(),
                status: RunStatus::Running,
                progress,
            },
        );

        let reporter = ProgressReporter {
            key: key.to_string(),
            total,
            runs: self.runs.clone(),
            events: self.events.clone(),
        };

        // 变量存储由本次运行独占
        let mut variables = VariableStore::new();
        let report = self
            .engine
            .run(key, scenario, &mut variables, token, Some(&reporter))
            .await;

        // 已被 cancel() 移除的运行不再重复推送
        if let Some(run) = self.runs.write().await.remove(key) {
            emit(
                &self.events,
                RunSnapshot {
                    scenario_key: key.to_string(),
                    status: report.status,
                    progress: RunProgress {
                        current: report.actions_count,
                        total: run.progress.total,
                    },
                },
            );
        }

        report
    }
}

/// 把引擎的进度写回运行记录并推送快照
struct ProgressReporter {
    key: String,
    total: Option<u64>,
    runs: RunRegistry,
    events: Option<mpsc::UnboundedSender<RunSnapshot>>,
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn on_action(&self, current: u64) {
        let progress = RunProgress {
            current,
            total: self.total,
        };

        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(&self.key) else {
            return;
        };
        run.progress = progress;

        emit(
            &self.events,
            RunSnapshot {
                scenario_key: self.key.clone(),
                status: run.status,
                progress,
            },
        );
    }
}

fn emit(events: &Option<mpsc::UnboundedSender<RunSnapshot>>, snapshot: RunSnapshot) {
    if let Some(sender) = events {
        if sender.send(snapshot).is_err() {
            debug!("快照接收端已关闭");
        }
    }
}
