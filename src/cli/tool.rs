//! CLI entry point for JSON tool calls
//!
//! Reads one `{"tool": ..., "args": ...}` document from the argument or from
//! stdin and prints the JSON response.

use std::io::Read;

use crate::api;
use crate::error::LedgerResult;
use crate::models::UserId;
use crate::storage::Storage;

/// Execute a tool call and print its response
///
/// Returns whether the call succeeded; failures are reported in the JSON
/// response rather than as an error.
pub fn handle_tool_command(storage: &Storage, user_id: UserId, input: Option<String>) -> LedgerResult<bool> {
    let input = match input {
        Some(input) => input,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let response = api::execute_json(storage, user_id, &input);
    println!("{}", response.to_json());
    Ok(response.ok)
}
