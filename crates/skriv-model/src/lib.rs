// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod mock;
pub mod provider;
pub mod retry;
pub mod types;

pub use mock::{MockProvider, ScriptedProvider};
pub use provider::ModelProvider;
pub use retry::retry_with_backoff;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, FunctionCall, Role, ToolSchema,
};
