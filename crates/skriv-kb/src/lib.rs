// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod descriptor;
pub mod git;
pub mod indexer;
pub mod lock;
pub mod notes;
pub mod tracker;

pub use descriptor::{KbDescriptor, KbRegistry};
pub use git::GitSync;
pub use indexer::KbIndexer;
pub use lock::{KbGuard, KbLockManager, LockError};
pub use notes::{note_relative_path, parse_metadata_block, slugify, NoteMetadata};
pub use tracker::{ProcessingRecord, ProcessingStatus, ProcessingTracker, TrackerError};
