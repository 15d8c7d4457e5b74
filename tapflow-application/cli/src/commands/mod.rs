//! CLI 命令处理模块

pub mod config;
pub mod output; // 报告与列表输出
pub mod scenario;
