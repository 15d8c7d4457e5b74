//! 协议抽象接口
//!
//! 执行引擎只依赖 [`ActionExecutor`]，具体设备能力由其余 trait 提供。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tapflow_common::{Region, Step};

use crate::{ActionOutcome, Result};

/// 动作执行器 trait
///
/// 执行单个叶子动作步骤 (包括条件评估时构造的临时步骤)。
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 执行动作
    async fn execute(&self, step: &Step) -> Result<ActionOutcome>;

    /// 执行器名称
    fn name(&self) -> &str {
        "executor"
    }
}

/// 屏幕截图
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    /// 图像宽度
    pub width: u32,

    /// 图像高度
    pub height: u32,

    /// 设备屏幕宽度
    pub device_width: u32,

    /// 设备屏幕高度
    pub device_height: u32,

    /// 图像数据
    pub data: Vec<u8>,
}

impl Screenshot {
    /// 图像坐标转换为设备坐标
    pub fn to_device_point(&self, x: i32, y: i32) -> (i32, i32) {
        if self.width == 0 || self.height == 0 {
            return (x, y);
        }
        let ratio_x = self.device_width as f64 / self.width as f64;
        let ratio_y = self.device_height as f64 / self.height as f64;
        (
            (x as f64 * ratio_x).round() as i32,
            (y as f64 * ratio_y).round() as i32,
        )
    }
}

/// 输入设备 trait
#[async_trait]
pub trait InputDevice: Send + Sync {
    /// 点击
    async fn tap(&self, x: i32, y: i32) -> Result<()>;

    /// 长按
    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> Result<()>;

    /// 滑动
    async fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> Result<()>;

    /// 发送按键
    async fn key_event(&self, key: &str) -> Result<()>;

    /// 输入文本
    async fn input_text(&self, text: &str) -> Result<()>;

    /// 截取屏幕
    async fn capture_screen(&self) -> Result<Screenshot>;
}

/// 模板匹配选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// 匹配阈值
    pub threshold: f64,

    /// 搜索区域提示
    pub crop_hint: Option<Region>,

    /// 是否忽略颜色差异
    pub color_invariant: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            crop_hint: None,
            color_invariant: false,
        }
    }
}

/// 模板匹配结果 (坐标为图像空间)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub found: bool,
    pub x: i32,
    pub y: i32,
    pub score: f64,
}

impl MatchResult {
    /// 未找到
    pub fn not_found(score: f64) -> Self {
        Self {
            found: false,
            x: 0,
            y: 0,
            score,
        }
    }
}

/// 图像匹配 trait
#[async_trait]
pub trait ImageMatcher: Send + Sync {
    /// 在截图中查找模板
    async fn find_template(
        &self,
        screenshot: &Screenshot,
        template: &str,
        options: &MatchOptions,
    ) -> Result<MatchResult>;
}

/// 音频采集 trait
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// 初始化采集设备
    async fn init(&self, device_id: Option<&str>) -> Result<()>;

    /// 读取当前分贝值
    async fn get_decibel(&self) -> Result<f64>;

    /// 释放采集设备
    async fn cleanup(&self) -> Result<()>;
}

/// 声音比对 trait
#[async_trait]
pub trait SoundMatcher: Send + Sync {
    /// 录制指定时长并返回与参考音频的相似度 (0.0 - 1.0)
    async fn similarity(&self, reference: &str, duration_ms: u64) -> Result<f64>;
}
