//! Shared server state.

use jukebox_core::ChatCommands;

/// State handed to every HTTP handler.
pub struct AppState {
    pub commands: ChatCommands,
}

impl AppState {
    pub fn new(commands: ChatCommands) -> Self {
        Self { commands }
    }
}
