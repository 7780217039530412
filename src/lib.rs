//! Conductor - 两层智能体编排引擎
//!
//! 模块划分：
//! - **agents**: Master（跨领域规划）与 Sub-Agent（单领域执行），prompt 模板
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、编排循环、会话监管、循环事件
//! - **engine**: 列表状态机、确认闸门、撤销台账（纯控制状态，无 I/O）
//! - **llm**: 决策服务（oracle）抽象与实现（OpenAI 兼容 / DeepSeek / Mock），响应 schema
//! - **memory**: 累积知识与工作数据、token 预算
//! - **session**: processTurn 入口与并发会话管理
//! - **tools**: 服务适配器、工具执行器、内存参考适配器

pub mod agents;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod session;
pub mod tools;

pub use crate::core::TurnReply;
pub use session::{SessionFactory, SessionManager};
