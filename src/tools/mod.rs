//! 工具箱：Tool trait、注册表、执行器、转接工具与内置领域工具

pub mod booking;
pub mod executor;
pub mod help_center;
pub mod incident;
pub mod property;
pub mod registry;
pub mod transfer;

pub use executor::{handoff_message, ToolExecutor, ToolResult};
pub use incident::IncidentStore;
pub use registry::{
    params_schema, parse_args, schema_of, Tool, ToolContext, ToolInfo, ToolOutcome, ToolRegistry,
};
pub use transfer::{
    checked_transfer_tool_name, is_valid_tool_name, snake_case, transfer_tool_name, TransferTool,
    MAX_TOOL_NAME_LEN, ROUTER_TRANSFER_TOOL,
};
