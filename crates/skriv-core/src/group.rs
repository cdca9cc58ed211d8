// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use skriv_chat::IncomingMessage;

/// An ordered batch of one user's messages, open until the aggregator's
/// idle window elapses.
#[derive(Debug, Clone)]
pub struct MessageGroup {
    pub group_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub messages: Vec<IncomingMessage>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl MessageGroup {
    pub fn open(first: IncomingMessage) -> Self {
        let now = Utc::now();
        Self {
            group_id: Uuid::new_v4().to_string(),
            user_id: first.user_id,
            chat_id: first.chat_id,
            messages: vec![first],
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    pub fn push(&mut self, msg: IncomingMessage) {
        self.last_seen_at = Utc::now();
        self.messages.push(msg);
    }

    /// The deduplication key: SHA-256 over the normalized concatenation of
    /// message texts and attachment hashes, hex-encoded.
    ///
    /// A single text-only message hashes to exactly `SHA-256(trimmed_text)`
    /// so external systems can precompute keys.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut first = true;
        for msg in &self.messages {
            if !first {
                hasher.update(b"\n");
            }
            first = false;
            hasher.update(msg.text.trim().as_bytes());
            for att in &msg.attachments {
                hasher.update(b"\n");
                hasher.update(att.content_hash.as_bytes());
            }
        }
        hex_encode(&hasher.finalize())
    }

    /// The combined text handed to the agent as task input: message texts
    /// in arrival order, forwarded-from markers and extracted attachment
    /// text included.
    pub fn combined_text(&self) -> String {
        let mut out = String::new();
        for msg in &self.messages {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            if let Some(from) = &msg.forward_from {
                out.push_str(&format!("[forwarded from {from}]\n"));
            }
            out.push_str(msg.text.trim());
            for att in &msg.attachments {
                if let Some(text) = &att.extracted_text {
                    out.push_str(&format!("\n[attachment {}]\n{text}", att.file_name));
                }
            }
        }
        out
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> IncomingMessage {
        IncomingMessage::text_only(42, 100, 1, text)
    }

    #[test]
    fn single_message_hash_is_sha256_of_text() {
        let group = MessageGroup::open(msg("Transformer attention is quadratic."));
        // SHA-256("Transformer attention is quadratic.")
        let mut h = Sha256::new();
        h.update(b"Transformer attention is quadratic.");
        let expected: String = h.finalize().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(group.content_hash(), expected);
    }

    #[test]
    fn hash_ignores_surrounding_whitespace() {
        let a = MessageGroup::open(msg("  hello  "));
        let b = MessageGroup::open(msg("hello"));
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_depends_on_message_order() {
        let mut a = MessageGroup::open(msg("one"));
        a.push(msg("two"));
        let mut b = MessageGroup::open(msg("two"));
        b.push(msg("one"));
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn attachment_hash_changes_group_hash() {
        let plain = MessageGroup::open(msg("text"));
        let mut with_att = msg("text");
        with_att.attachments.push(skriv_chat::Attachment {
            file_name: "doc.pdf".into(),
            mime_type: None,
            content_hash: "abc123".into(),
            extracted_text: None,
        });
        let with_att = MessageGroup::open(with_att);
        assert_ne!(plain.content_hash(), with_att.content_hash());
    }

    #[test]
    fn combined_text_includes_forward_marker() {
        let mut m = msg("quoted wisdom");
        m.forward_from = Some("alice".into());
        let group = MessageGroup::open(m);
        let text = group.combined_text();
        assert!(text.contains("[forwarded from alice]"));
        assert!(text.contains("quoted wisdom"));
    }

    #[test]
    fn push_preserves_order() {
        let mut g = MessageGroup::open(msg("first"));
        g.push(msg("second"));
        g.push(msg("third"));
        let text = g.combined_text();
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        let third = text.find("third").unwrap();
        assert!(first < second && second < third);
    }
}
