pub mod create_command;
pub mod list_commands;

pub use create_command::{CreateCommandRequest, CreateCommandResponse, handle_create_command};
pub use list_commands::{CommandListResponse, handle_get_command, handle_list_commands};

/// Prefix shared by every cached command listing.
pub const COMMAND_LIST_CACHE_PREFIX: &str = "commands:list";
