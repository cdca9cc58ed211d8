// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document or media item attached to a chat message.
///
/// Binary parsing happens outside the core; the aggregator and the hash
/// computation only need a stable identity (`content_hash`) and a display
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    /// SHA-256 of the attachment bytes, hex-encoded, computed at ingest
    pub content_hash: String,
    /// Extracted text, when the front-end parsed the document
    pub extracted_text: Option<String>,
}

/// One inbound chat message as delivered by the transport port.
/// Immutable after ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
    /// Original author for forwarded messages
    pub forward_from: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    /// Minimal constructor used widely by tests.
    pub fn text_only(user_id: i64, chat_id: i64, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            message_id,
            chat_id,
            user_id,
            text: text.into(),
            forward_from: None,
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
