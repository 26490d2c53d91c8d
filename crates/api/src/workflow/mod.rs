//! Outbound HTTP collaborators: the report workflow and the chat widget

pub mod chat;
pub mod client;

pub use chat::{ChatClient, ChatError};
pub use client::{WorkflowClient, WorkflowError, WorkflowOutput};
