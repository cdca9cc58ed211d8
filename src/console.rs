// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use skriv_chat::{BotError, BotPort, MessageHandle, SendOptions};

/// Development transport: outbound messages go to stdout.
///
/// Useful for driving the core from a terminal; the production chat
/// transport implements the same port out of tree.
#[derive(Default)]
pub struct ConsoleBot {
    next_id: AtomicI64,
}

#[async_trait]
impl BotPort for ConsoleBot {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _opts: &SendOptions,
    ) -> Result<MessageHandle, BotError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("[chat {chat_id} msg {message_id}] {text}");
        Ok(MessageHandle {
            chat_id,
            message_id,
        })
    }

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        _opts: &SendOptions,
    ) -> Result<(), BotError> {
        println!(
            "[chat {} msg {} edited] {text}",
            handle.chat_id, handle.message_id
        );
        Ok(())
    }

    async fn delete_message(&self, handle: &MessageHandle) -> Result<(), BotError> {
        println!(
            "[chat {} msg {} deleted]",
            handle.chat_id, handle.message_id
        );
        Ok(())
    }
}
