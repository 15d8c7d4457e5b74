//! 动作执行结果

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tapflow_common::VarValue;

/// 匹配位置 (设备坐标)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPoint {
    pub x: i32,
    pub y: i32,
    pub score: f64,
}

/// 动作执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionOutcome {
    /// 是否成功
    pub success: bool,

    /// 错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 音量 (分贝)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// 声音相似度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,

    /// 图像匹配位置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchedPoint>,

    /// 附加数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionOutcome {
    /// 成功
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// 失败
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_match(mut self, x: i32, y: i32, score: f64) -> Self {
        self.matched = Some(MatchedPoint { x, y, score });
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// 写入 last_action_result 的主值
    ///
    /// 优先级: 音量 > 相似度 > 匹配分数 > 成功标志。
    pub fn primary_value(&self) -> VarValue {
        if let Some(volume) = self.volume {
            VarValue::Number(volume)
        } else if let Some(similarity) = self.similarity {
            VarValue::Number(similarity)
        } else if let Some(matched) = &self.matched {
            VarValue::Number(matched.score)
        } else {
            VarValue::Bool(self.success)
        }
    }
}
