//! JSON-lines stand-in for the chat platform.
//!
//! Every outbound action is printed as one JSON object on stdout. Message
//! ids are allocated locally, so replies and edits can point at earlier
//! posts.

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{DispatchError, Result};
use crate::platform::{MessageRef, Messenger, Outbound};

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ConsoleAction<'a> {
    Post {
        message: &'a MessageRef,
        #[serde(flatten)]
        body: &'a Outbound,
    },
    Reply {
        message: &'a MessageRef,
        in_reply_to: u64,
        #[serde(flatten)]
        body: &'a Outbound,
    },
    Edit {
        message: &'a MessageRef,
        #[serde(flatten)]
        body: &'a Outbound,
    },
    DirectMessage {
        user_id: u64,
        #[serde(flatten)]
        body: &'a Outbound,
    },
    Ephemeral {
        channel_id: u64,
        user_id: u64,
        content: &'a str,
    },
    React {
        message: &'a MessageRef,
        emoji: &'a str,
    },
}

/// [`Messenger`] that writes to stdout.
///
/// `closed_dms` simulates members who refuse direct messages; references to
/// message ids this process never allocated are treated as deleted.
pub struct ConsoleMessenger {
    next_id: AtomicU64,
    closed_dms: HashSet<u64>,
    out: Mutex<std::io::Stdout>,
}

impl ConsoleMessenger {
    pub fn new(closed_dms: impl IntoIterator<Item = u64>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            closed_dms: closed_dms.into_iter().collect(),
            out: Mutex::new(std::io::stdout()),
        }
    }

    fn allocate(&self, guild_id: u64, channel_id: u64) -> MessageRef {
        MessageRef::new(guild_id, channel_id, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn known(&self, message: &MessageRef) -> Result<()> {
        if message.message_id == 0 || message.message_id >= self.next_id.load(Ordering::SeqCst) {
            return Err(DispatchError::StaleReference(message.jump_url()));
        }
        Ok(())
    }

    fn emit(&self, action: &ConsoleAction<'_>) -> Result<()> {
        let line = serde_json::to_string(action)?;
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(out, "{}", line).map_err(|e| DispatchError::Transport(e.to_string()))?;
        out.flush().map_err(|e| DispatchError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn post(&self, guild_id: u64, channel_id: u64, message: Outbound) -> Result<MessageRef> {
        let r = self.allocate(guild_id, channel_id);
        self.emit(&ConsoleAction::Post {
            message: &r,
            body: &message,
        })?;
        Ok(r)
    }

    async fn reply(&self, target: &MessageRef, message: Outbound) -> Result<MessageRef> {
        self.known(target)?;
        let r = self.allocate(target.guild_id, target.channel_id);
        self.emit(&ConsoleAction::Reply {
            message: &r,
            in_reply_to: target.message_id,
            body: &message,
        })?;
        Ok(r)
    }

    async fn edit(&self, target: &MessageRef, message: Outbound) -> Result<()> {
        self.known(target)?;
        self.emit(&ConsoleAction::Edit {
            message: target,
            body: &message,
        })
    }

    async fn direct_message(&self, user_id: u64, message: Outbound) -> Result<()> {
        if self.closed_dms.contains(&user_id) {
            return Err(DispatchError::NotificationUndeliverable(user_id));
        }
        self.emit(&ConsoleAction::DirectMessage {
            user_id,
            body: &message,
        })
    }

    async fn ephemeral(&self, channel_id: u64, user_id: u64, content: String) -> Result<()> {
        self.emit(&ConsoleAction::Ephemeral {
            channel_id,
            user_id,
            content: &content,
        })
    }

    async fn react(&self, target: &MessageRef, emoji: &str) -> Result<()> {
        self.emit(&ConsoleAction::React {
            message: target,
            emoji,
        })
    }
}
