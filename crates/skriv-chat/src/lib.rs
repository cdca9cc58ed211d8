// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod message;
pub mod outbound;
pub mod port;
pub mod throttle;

pub use message::{Attachment, IncomingMessage};
pub use outbound::Outbound;
pub use port::{BotError, BotPort, MessageHandle, SendOptions};
pub use throttle::Throttle;
