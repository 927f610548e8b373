//! Editor session management module
//!
//! This module contains:
//! - Session state and the update loop
//! - Message and command types for editor interactions
//! - Keyboard shortcuts

pub mod messages;
pub mod shortcuts;
pub mod state;

pub use messages::{Command, Msg};
pub use state::EditorSession;
