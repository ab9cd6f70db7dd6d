//! Toolbox agent runtime: tool sessions and model conversation turns.
//!
//! This crate connects a model service to the tools of an MCP server and
//! runs the conversation loop between them.
//!
//! # Overview
//!
//! - **Session**: a connection to a tool server plus its tool catalog.
//! - **ConversationState**: the ordered turn history of one conversation.
//! - **TurnOrchestrator**: sends a user message, executes the tools the model
//!   asks for, and returns the final answer.
//! - **Backend**: a trait abstracting the model service (Bedrock, stubs).
//!
//! # Example
//!
//! ```ignore
//! use mcp::ClientConfig;
//! use runtime::{BedrockBackend, ConversationState, Session};
//!
//! # async fn example() -> runtime::Result<()> {
//! let session = Session::connect(ClientConfig::default()).await?;
//! let backend = BedrockBackend::builder("bedrock-api-key", runtime::DEFAULT_MODEL_ID)
//!     .region("us-east-1")
//!     .build();
//!
//! let mut conversation = ConversationState::new();
//! let answer = session
//!     .orchestrator(&backend)
//!     .converse(&mut conversation, "How many rows in table X?")
//!     .await?;
//! println!("{answer}");
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod conversation;
mod error;
pub mod model;
mod orchestrator;
mod providers;
mod session;
pub mod tools;

pub use conversation::ConversationState;
pub use error::{Error, Result};
pub use model::{Backend, ModelError, ModelRequest, ModelResponse, StopReason, Turn};
pub use orchestrator::{DEFAULT_MAX_ROUNDS, Dispatch, TurnOrchestrator};
pub use providers::{
    BedrockBackend, BedrockBackendBuilder, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_ID, DEFAULT_REGION,
};
pub use session::Session;
pub use tools::{ToolCatalog, ToolInvoker, ToolServer};
