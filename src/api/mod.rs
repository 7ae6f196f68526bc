//! JSON tool-call surface
//!
//! Clients send `{"tool": ..., "args": ...}` documents and receive a
//! [`ToolResponse`]. Every service operation and report is reachable here.

pub mod call;
pub mod dispatch;
pub mod response;

pub use call::ToolCall;
pub use dispatch::{execute, execute_json};
pub use response::{ToolError, ToolResponse};
