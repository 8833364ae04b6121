//! Concierge - Rust 多智能体客服路由系统
//!
//! 模块划分：
//! - **agents**: Agent 定义、内置注册表、覆盖合并、路由构建与 Agent 树
//! - **admin**: Agent 覆盖的管理服务（增删改查 + 重建）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话、可热重建的 Runner、回合编排引擎、组件装配
//! - **gateway**: 传输事件协议、会话管理、多语言文案与对话服务
//! - **llm**: 模型后端抽象与实现（OpenAI 兼容 / Mock / Scripted）与限流重试
//! - **observability**: 日志初始化与对话审计
//! - **store**: 覆盖记录存储（本地 JSON / HTTP 对象存储 / 内存）
//! - **tools**: Tool trait、工具目录、执行器与领域工具
//! - **server**: WebSocket + 管理 REST（feature `web`）

pub mod admin;
pub mod agents;
pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod observability;
#[cfg(feature = "web")]
pub mod server;
pub mod store;
pub mod tools;
