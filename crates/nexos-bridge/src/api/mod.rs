//! HTTP surface of the bridge

mod chats;
mod completions;
mod error;
mod files;
mod server;

pub use chats::{CreateChatRequest, CreateChatResponse, SwitchChatRequest, SwitchChatResponse};
pub use completions::{CHAT_ID_HEADER, public_base};
pub use error::ApiError;
pub use server::{AppState, BridgeServer, create_router};
