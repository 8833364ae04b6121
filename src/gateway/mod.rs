//! 网关：会话管理、传输事件协议、本地化文案与对话服务
//!
//! 传输层（终端 REPL / WebSocket）只与 ChatService 打交道：
//! - **message**: ServerEvent / ClientMessage
//! - **messages**: 面向用户的多语言文案
//! - **session**: 会话表（每个会话一把锁，回合串行）
//! - **service**: 建立 / 处理 / 关闭会话

pub mod message;
pub mod messages;
mod service;
mod session;

pub use message::{ClientMessage, ServerEvent};
pub use service::ChatService;
pub use session::{SessionManager, SessionSlot};
