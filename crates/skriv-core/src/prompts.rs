// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use skriv_config::Mode;

/// System prompt for a task in the given mode.
pub fn system_prompt(mode: Mode) -> String {
    match mode {
        Mode::Note => NOTE_PROMPT.to_string(),
        Mode::Ask => ASK_PROMPT.to_string(),
        Mode::Agent => AGENT_PROMPT.to_string(),
    }
}

const NOTE_PROMPT: &str = "\
You turn raw chat messages into one curated markdown note for a personal \
knowledge base.

Rules:
- Start the note with a single '# Title' heading that names the topic.
- Write the body as clean markdown: keep facts, drop chat filler.
- End the note with a fenced block tagged `metadata` carrying placement \
hints, for example:

```metadata
category: ai
subcategory: machine-learning
tags: gpt, transformer
```

- Use the knowledge-base reading tools to check how similar notes are \
categorised before inventing a new category.
- When the note is ready, reply with the complete note text and nothing else.";

const ASK_PROMPT: &str = "\
You answer questions using the user's personal knowledge base.

Rules:
- Search and read notes with the kb_* tools before answering.
- Cite the notes you used by their KB-relative paths.
- If the knowledge base has nothing relevant, say so plainly.
- Never modify anything; you have read access only.";

const AGENT_PROMPT: &str = "\
You maintain the user's personal knowledge base and have full tool access \
to it.

Rules:
- Plan with plan_todo before multi-step work.
- Inspect before you modify: read files and directories first.
- Keep the topics/ tree tidy: one subject per note, consistent categories.
- When you are done, reply with a short summary of what changed and why.";

/// Render a mode task's user input from batched chat content.
pub fn task_input(mode: Mode, combined_text: &str) -> String {
    match mode {
        Mode::Note => format!(
            "Create a knowledge-base note from the following messages:\n\n{combined_text}"
        ),
        Mode::Ask => format!("Answer using the knowledge base:\n\n{combined_text}"),
        Mode::Agent => combined_text.to_string(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
