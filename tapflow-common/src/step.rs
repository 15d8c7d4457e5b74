//! 场景步骤模型
//!
//! 场景由一个有序的扁平步骤列表构成，嵌套关系不单独存储，
//! 而是由步骤类型 (`type`) 和配对标识 (`pair_id`) 隐式推导。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 场景步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 步骤唯一标识
    pub id: String,

    /// 步骤名称 (可选，用于日志和报告)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 配对标识，块起始步骤与其结束标记共享同一个值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,

    /// 步骤失败时的处理策略
    #[serde(default, skip_serializing_if = "ErrorPolicy::is_default")]
    pub on_error: ErrorPolicy,

    /// 步骤类型及其参数
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// 创建步骤
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            pair_id: None,
            on_error: ErrorPolicy::default(),
            kind,
        }
    }

    /// 设置配对标识
    pub fn with_pair(mut self, pair_id: impl Into<String>) -> Self {
        self.pair_id = Some(pair_id.into());
        self
    }

    /// 设置步骤名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置失败处理策略
    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    /// 日志和报告中使用的显示名称
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// 是否为隐式 if (带配对标识的条件起始步骤)
    pub fn is_implicit_if(&self) -> bool {
        self.kind.is_condition_starter() && self.pair_id.is_some()
    }

    /// 是否为块起始步骤 (会增加嵌套深度)
    ///
    /// `else-if` / `else` 是中间标记，不计入。
    pub fn is_block_opener(&self) -> bool {
        matches!(
            self.kind,
            StepKind::If(_) | StepKind::While(_) | StepKind::Loop(_)
        ) || self.is_implicit_if()
    }

    /// 块结构标记
    pub fn marker(&self) -> Option<BlockMarker> {
        self.kind.marker()
    }

    /// 步骤分类
    ///
    /// 条件起始步骤只有在配对使用时才属于控制流，单独使用时是普通动作。
    pub fn category(&self) -> StepCategory {
        if self.is_implicit_if() {
            return StepCategory::BlockOpener;
        }
        self.kind.category()
    }
}

/// 步骤失败处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// 记录日志并继续执行 (默认)
    #[default]
    Continue,
    /// 升级为致命错误，终止整个运行
    Stop,
    /// 不记录日志，直接继续
    Skip,
}

impl ErrorPolicy {
    fn is_default(&self) -> bool {
        *self == ErrorPolicy::Continue
    }
}

/// 块结构标记 (中间标记与结束标记)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMarker {
    ElseIf,
    Else,
    EndIf,
    EndLoop,
    EndWhile,
}

impl BlockMarker {
    /// 是否为结束标记 (会减少嵌套深度)
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            BlockMarker::EndIf | BlockMarker::EndLoop | BlockMarker::EndWhile
        )
    }

    /// 是否为中间标记
    pub fn is_mid_marker(&self) -> bool {
        matches!(self, BlockMarker::ElseIf | BlockMarker::Else)
    }
}

/// 步骤分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCategory {
    /// 块起始 (if / while / loop / 隐式 if)
    BlockOpener,
    /// 中间标记 (else-if / else)
    MidMarker,
    /// 块结束 (endif / end-loop / end-while)
    Terminator,
    /// 控制终止 (success / skip / fail)
    Control,
    /// 变量操作 (set-variable / calc-variable)
    Data,
    /// 交给动作执行器的叶子动作
    Leaf,
}

/// 步骤类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    // ========================================
    // 控制流
    // ========================================
    /// 条件分支
    If(ConditionGroup),

    /// 否则如果
    ElseIf(ConditionGroup),

    /// 否则
    Else,

    /// 条件块结束
    #[serde(alias = "end-if")]
    Endif,

    /// 条件循环
    While(ConditionGroup),

    /// 条件循环结束
    EndWhile,

    /// 计数循环
    Loop(LoopSpec),

    /// 计数循环结束
    EndLoop,

    /// 以通过状态结束运行
    Success(Termination),

    /// 以跳过状态结束运行
    Skip(Termination),

    /// 以失败状态结束运行
    Fail(Termination),

    // ========================================
    // 变量操作
    // ========================================
    /// 设置变量
    SetVariable(SetVariableSpec),

    /// 变量计算
    CalcVariable(CalcVariableSpec),

    // ========================================
    // 设备动作
    // ========================================
    /// 点击
    Tap { x: i32, y: i32 },

    /// 长按
    LongPress {
        x: i32,
        y: i32,
        #[serde(default = "default_long_press_ms")]
        duration_ms: u64,
    },

    /// 拖动
    Drag {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
        #[serde(default = "default_drag_ms")]
        duration_ms: u64,
    },

    /// 等待
    Wait { duration_ms: u64 },

    /// 键盘输入
    Keyboard(KeyboardSpec),

    /// 截图
    Screenshot,

    /// 输出日志
    Log { message: String },

    /// 点击最近一次匹配到的图像位置
    TapMatchedImage {
        #[serde(default)]
        offset_x: i32,
        #[serde(default)]
        offset_y: i32,
    },

    // ========================================
    // 条件起始动作 (配对 endif 时作为隐式 if)
    // ========================================
    /// 图像匹配
    ImageMatch(ImageMatchSpec),

    /// 获取音量
    GetVolume(VolumeSpec),

    /// 声音比对
    SoundCheck(SoundCheckSpec),
}

fn default_long_press_ms() -> u64 {
    1000
}

fn default_drag_ms() -> u64 {
    500
}

impl StepKind {
    /// 序列化时使用的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::If(_) => "if",
            StepKind::ElseIf(_) => "else-if",
            StepKind::Else => "else",
            StepKind::Endif => "endif",
            StepKind::While(_) => "while",
            StepKind::EndWhile => "end-while",
            StepKind::Loop(_) => "loop",
            StepKind::EndLoop => "end-loop",
            StepKind::Success(_) => "success",
            StepKind::Skip(_) => "skip",
            StepKind::Fail(_) => "fail",
            StepKind::SetVariable(_) => "set-variable",
            StepKind::CalcVariable(_) => "calc-variable",
            StepKind::Tap { .. } => "tap",
            StepKind::LongPress { .. } => "long-press",
            StepKind::Drag { .. } => "drag",
            StepKind::Wait { .. } => "wait",
            StepKind::Keyboard(_) => "keyboard",
            StepKind::Screenshot => "screenshot",
            StepKind::Log { .. } => "log",
            StepKind::TapMatchedImage { .. } => "tap-matched-image",
            StepKind::ImageMatch(_) => "image-match",
            StepKind::GetVolume(_) => "get-volume",
            StepKind::SoundCheck(_) => "sound-check",
        }
    }

    /// 是否为条件起始动作
    pub fn is_condition_starter(&self) -> bool {
        matches!(
            self,
            StepKind::ImageMatch(_) | StepKind::GetVolume(_) | StepKind::SoundCheck(_)
        )
    }

    /// 块结构标记
    pub fn marker(&self) -> Option<BlockMarker> {
        match self {
            StepKind::ElseIf(_) => Some(BlockMarker::ElseIf),
            StepKind::Else => Some(BlockMarker::Else),
            StepKind::Endif => Some(BlockMarker::EndIf),
            StepKind::EndLoop => Some(BlockMarker::EndLoop),
            StepKind::EndWhile => Some(BlockMarker::EndWhile),
            _ => None,
        }
    }

    /// 不考虑配对信息的分类
    pub fn category(&self) -> StepCategory {
        match self {
            StepKind::If(_) | StepKind::While(_) | StepKind::Loop(_) => StepCategory::BlockOpener,
            StepKind::ElseIf(_) | StepKind::Else => StepCategory::MidMarker,
            StepKind::Endif | StepKind::EndWhile | StepKind::EndLoop => StepCategory::Terminator,
            StepKind::Success(_) | StepKind::Skip(_) | StepKind::Fail(_) => StepCategory::Control,
            StepKind::SetVariable(_) | StepKind::CalcVariable(_) => StepCategory::Data,
            _ => StepCategory::Leaf,
        }
    }

    /// 条件组 (仅 if / else-if / while 拥有)
    pub fn condition_group(&self) -> Option<&ConditionGroup> {
        match self {
            StepKind::If(group) | StepKind::ElseIf(group) | StepKind::While(group) => Some(group),
            _ => None,
        }
    }
}

/// 条件组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConditionGroup {
    /// 条件列表，空列表求值为 false
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// 组合运算符，整个条件组只有一个
    #[serde(default)]
    pub condition_operator: LogicOperator,
}

impl ConditionGroup {
    pub fn new(conditions: Vec<Condition>, condition_operator: LogicOperator) -> Self {
        Self {
            conditions,
            condition_operator,
        }
    }
}

/// 单个条件
///
/// 由 `action_type` 和 `params` 构造出一个临时的动作步骤，
/// 交给动作执行器执行后再从结果推导布尔值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// 动作类型 (例如 "image-match", "get-volume")
    pub action_type: String,

    /// 动作参数
    #[serde(default)]
    pub params: Map<String, Value>,

    /// 是否取反
    #[serde(default)]
    pub negate: bool,

    /// 与下一个条件的组合运算符 (仅记录，组合时使用步骤级运算符)
    #[serde(default)]
    pub operator: LogicOperator,
}

impl Condition {
    /// 创建条件
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            action_type: action_type.into(),
            params,
            negate: false,
            operator: LogicOperator::And,
        }
    }

    /// 设置取反
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// 构造临时步骤类型
    pub fn to_step_kind(&self) -> serde_json::Result<StepKind> {
        let mut object = self.params.clone();
        object.insert("type".to_string(), Value::String(self.action_type.clone()));
        serde_json::from_value(Value::Object(object))
    }
}

/// 逻辑运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogicOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// 计数循环参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoopSpec {
    /// 次数来源
    #[serde(default)]
    pub count_type: CountType,

    /// 固定次数 (count_type = constant)
    #[serde(default)]
    pub count: u32,

    /// 次数变量名 (count_type = variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl LoopSpec {
    /// 固定次数循环
    pub fn times(count: u32) -> Self {
        Self {
            count_type: CountType::Constant,
            count,
            variable: None,
        }
    }

    /// 从变量读取次数的循环
    pub fn from_variable(name: impl Into<String>) -> Self {
        Self {
            count_type: CountType::Variable,
            count: 0,
            variable: Some(name.into()),
        }
    }
}

/// 循环次数来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountType {
    #[default]
    Constant,
    Variable,
}

/// 控制终止参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Termination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Termination {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// 变量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl VarValue {
    /// 转换为数值
    ///
    /// 布尔值按 1/0 处理，文本尝试按数字解析。
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VarValue::Number(n) => Some(*n),
            VarValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            VarValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        VarValue::Number(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        VarValue::Bool(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::Text(value.to_string())
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Number(n) => write!(f, "{}", n),
            VarValue::Bool(b) => write!(f, "{}", b),
            VarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 设置变量参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVariableSpec {
    /// 变量名
    pub name: String,

    /// 值来源
    #[serde(default)]
    pub source: ValueSource,

    /// 常量值 (source = constant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<VarValue>,
}

/// 变量值来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// 上一个动作的结果
    Previous,
    /// 常量
    #[default]
    Constant,
}

/// 变量计算参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcVariableSpec {
    /// 结果写入的变量
    pub target: String,
    pub operand1: Operand,
    pub operation: CalcOperation,
    pub operand2: Operand,
}

/// 计算操作数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    /// 引用变量
    Variable { name: String },
    /// 常量
    Constant { value: f64 },
}

/// 四则运算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalcOperation {
    #[serde(rename = "+", alias = "add")]
    Add,
    #[serde(rename = "-", alias = "subtract")]
    Subtract,
    #[serde(rename = "*", alias = "multiply")]
    Multiply,
    #[serde(rename = "/", alias = "divide")]
    Divide,
}

impl fmt::Display for CalcOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CalcOperation::Add => "+",
            CalcOperation::Subtract => "-",
            CalcOperation::Multiply => "*",
            CalcOperation::Divide => "/",
        };
        f.write_str(symbol)
    }
}

/// 键盘输入参数 (按键与文本二选一)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KeyboardSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// 矩形区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// 图像匹配参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMatchSpec {
    /// 模板图像引用 (路径或标识)
    pub template: String,

    /// 匹配阈值 (0.0 - 1.0)
    #[serde(default = "default_match_threshold")]
    pub threshold: f64,

    /// 搜索区域提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    /// 是否忽略颜色差异
    #[serde(default)]
    pub color_invariant: bool,
}

fn default_match_threshold() -> f64 {
    0.8
}

/// 获取音量参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// 音频采集设备
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// 采样窗口 (毫秒)
    #[serde(default = "default_volume_window_ms")]
    pub duration_ms: u64,

    /// 比较运算符
    #[serde(default = "default_comparison")]
    pub operator: String,

    /// 比较基准值 (分贝)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

fn default_volume_window_ms() -> u64 {
    1000
}

/// 声音比对参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundCheckSpec {
    /// 参考音频引用
    pub reference: String,

    /// 音频采集设备
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// 录制时长 (毫秒)
    #[serde(default = "default_sound_window_ms")]
    pub duration_ms: u64,

    /// 比较运算符
    #[serde(default = "default_comparison")]
    pub operator: String,

    /// 相似度阈值 (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

fn default_sound_window_ms() -> u64 {
    3000
}

fn default_comparison() -> String {
    ">=".to_string()
}
