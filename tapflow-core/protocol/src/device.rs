//! 设备动作执行器
//!
//! 把输入设备、图像匹配、音频采集和声音比对组合成一个 [`ActionExecutor`]。

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tapflow_common::{
    ImageMatchSpec, KeyboardSpec, SoundCheckSpec, Step, StepKind, VolumeSpec,
};

use crate::{
    ActionExecutor, ActionOutcome, AudioCapture, ImageMatcher, InputDevice, MatchOptions,
    MatchedPoint, ProtocolError, Result, SoundMatcher,
};

/// 音量采样间隔
const VOLUME_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// 设备动作执行器
pub struct DeviceActionExecutor {
    /// 输入设备
    input: Arc<dyn InputDevice>,

    /// 图像匹配
    matcher: Arc<dyn ImageMatcher>,

    /// 音频采集
    audio: Arc<dyn AudioCapture>,

    /// 声音比对
    sound: Arc<dyn SoundMatcher>,

    /// 最近一次图像匹配位置 (设备坐标)
    last_match: Mutex<Option<MatchedPoint>>,
}

impl DeviceActionExecutor {
    /// 创建新的设备动作执行器
    pub fn new(
        input: Arc<dyn InputDevice>,
        matcher: Arc<dyn ImageMatcher>,
        audio: Arc<dyn AudioCapture>,
        sound: Arc<dyn SoundMatcher>,
    ) -> Self {
        Self {
            input,
            matcher,
            audio,
            sound,
            last_match: Mutex::new(None),
        }
    }

    /// 最近一次图像匹配位置
    pub async fn last_match(&self) -> Option<MatchedPoint> {
        *self.last_match.lock().await
    }

    async fn image_match(&self, spec: &ImageMatchSpec) -> Result<ActionOutcome> {
        let screenshot = self.input.capture_screen().await?;
        let options = MatchOptions {
            threshold: spec.threshold,
            crop_hint: spec.region,
            color_invariant: spec.color_invariant,
        };

        let result = self
            .matcher
            .find_template(&screenshot, &spec.template, &options)
            .await?;

        if !result.found {
            debug!("未找到模板 {} (score={:.3})", spec.template, result.score);
            return Ok(ActionOutcome::failed(format!("未找到模板: {}", spec.template))
                .with_data(json!({ "score": result.score })));
        }

        let (x, y) = screenshot.to_device_point(result.x, result.y);
        debug!(
            "模板 {} 匹配成功: ({}, {}) score={:.3}",
            spec.template, x, y, result.score
        );

        *self.last_match.lock().await = Some(MatchedPoint {
            x,
            y,
            score: result.score,
        });

        Ok(ActionOutcome::ok().with_match(x, y, result.score))
    }

    /// 在采样窗口内读取峰值分贝
    async fn get_volume(&self, spec: &VolumeSpec) -> Result<ActionOutcome> {
        self.audio.init(spec.device_id.as_deref()).await?;

        let sampled = self.sample_peak(Duration::from_millis(spec.duration_ms)).await;

        if let Err(e) = self.audio.cleanup().await {
            warn!("释放音频采集设备失败: {}", e);
        }

        let peak = sampled?;
        debug!("采样窗口 {}ms 内峰值音量: {:.1} dB", spec.duration_ms, peak);
        Ok(ActionOutcome::ok().with_volume(peak))
    }

    async fn sample_peak(&self, window: Duration) -> Result<f64> {
        let started = Instant::now();
        let mut peak = self.audio.get_decibel().await?;

        while started.elapsed() < window {
            tokio::time::sleep(VOLUME_SAMPLE_INTERVAL).await;
            let value = self.audio.get_decibel().await?;
            if value > peak {
                peak = value;
            }
        }

        Ok(peak)
    }

    async fn sound_check(&self, spec: &SoundCheckSpec) -> Result<ActionOutcome> {
        let similarity = self
            .sound
            .similarity(&spec.reference, spec.duration_ms)
            .await?;
        debug!("声音 {} 相似度: {:.3}", spec.reference, similarity);
        Ok(ActionOutcome::ok().with_similarity(similarity))
    }

    async fn keyboard(&self, spec: &KeyboardSpec) -> Result<ActionOutcome> {
        match (&spec.key, &spec.text) {
            (Some(key), _) => self.input.key_event(key).await?,
            (None, Some(text)) => self.input.input_text(text).await?,
            (None, None) => {
                return Err(ProtocolError::InvalidParams(
                    "键盘动作缺少 key 或 text".to_string(),
                ))
            }
        }
        Ok(ActionOutcome::ok())
    }

    async fn tap_matched_image(&self, offset_x: i32, offset_y: i32) -> Result<ActionOutcome> {
        let matched = match self.last_match().await {
            Some(matched) => matched,
            None => return Ok(ActionOutcome::failed("没有可用的图像匹配结果")),
        };

        let (x, y) = (matched.x + offset_x, matched.y + offset_y);
        self.input.tap(x, y).await?;
        Ok(ActionOutcome::ok().with_match(x, y, matched.score))
    }
}

#[async_trait]
impl ActionExecutor for DeviceActionExecutor {
    async fn execute(&self, step: &Step) -> Result<ActionOutcome> {
        match &step.kind {
            StepKind::Tap { x, y } => {
                self.input.tap(*x, *y).await?;
                Ok(ActionOutcome::ok())
            }
            StepKind::LongPress { x, y, duration_ms } => {
                self.input.long_press(*x, *y, *duration_ms).await?;
                Ok(ActionOutcome::ok())
            }
            StepKind::Drag {
                from_x,
                from_y,
                to_x,
                to_y,
                duration_ms,
            } => {
                self.input
                    .swipe((*from_x, *from_y), (*to_x, *to_y), *duration_ms)
                    .await?;
                Ok(ActionOutcome::ok())
            }
            StepKind::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(ActionOutcome::ok())
            }
            StepKind::Keyboard(spec) => self.keyboard(spec).await,
            StepKind::Screenshot => {
                let screenshot = self.input.capture_screen().await?;
                Ok(ActionOutcome::ok().with_data(json!({
                    "width": screenshot.width,
                    "height": screenshot.height,
                })))
            }
            StepKind::Log { message } => {
                info!(step_id = %step.id, "{}", message);
                Ok(ActionOutcome::ok())
            }
            StepKind::TapMatchedImage { offset_x, offset_y } => {
                self.tap_matched_image(*offset_x, *offset_y).await
            }
            StepKind::ImageMatch(spec) => self.image_match(spec).await,
            StepKind::GetVolume(spec) => self.get_volume(spec).await,
            StepKind::SoundCheck(spec) => self.sound_check(spec).await,
            other => Err(ProtocolError::UnsupportedAction(
                other.type_name().to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "device"
    }
}
