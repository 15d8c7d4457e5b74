//! 变量存储

use std::collections::HashMap;

use tapflow_common::VarValue;

/// 单次运行的变量存储
///
/// 每次顶层运行开始时重置。`last_action_result` 记录最近一次动作
/// (包括条件探测) 的主值，供 `set-variable` 的 previous 来源读取。
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: HashMap<String, VarValue>,
    last_action_result: Option<VarValue>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空所有变量和最近动作结果
    pub fn reset(&mut self) {
        self.values.clear();
        self.last_action_result = None;
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.values.get(name)
    }

    /// 读取数值，变量不存在或无法转换时返回 None
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(VarValue::as_number)
    }

    pub fn set(&mut self, name: impl Into<String>, value: VarValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn last_action_result(&self) -> Option<&VarValue> {
        self.last_action_result.as_ref()
    }

    pub fn set_last_action_result(&mut self, value: VarValue) {
        self.last_action_result = Some(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
