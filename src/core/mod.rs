//! 核心编排层：错误类型、会话、可热重建的 Runner、回合调度引擎、启动装配

pub mod builder;
pub mod engine;
pub mod error;
pub mod runner;
pub mod session;

pub use builder::{AppComponents, ConciergeBuilder};
pub use engine::{
    continuation_note, EngineConfig, EngineEvent, OrchestrationEngine, TurnOutcome, TurnReply,
};
pub use error::{AdminError, LlmError, RegistryError, StoreError, TurnError};
pub use runner::{Runner, RunnerHandle};
pub use session::Session;
