//! Chat-platform collaborator interface.
//!
//! The connection runtime lives outside this crate. Everything the
//! coordinator needs from it is expressed here: who the actors are, how to
//! point at a posted message, and the handful of send/edit primitives in
//! [`Messenger`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A guild member as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub display_name: String,
    #[serde(default)]
    pub role_ids: Vec<u64>,
    #[serde(default)]
    pub role_names: Vec<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Member {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role_ids: Vec::new(),
            role_names: Vec::new(),
            is_bot: false,
        }
    }

    pub fn with_role(mut self, role_id: u64, name: impl Into<String>) -> Self {
        self.role_ids.push(role_id);
        self.role_names.push(name.into());
        self
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    pub fn mention(&self) -> String {
        mention(self.id)
    }
}

pub fn mention(user_id: u64) -> String {
    format!("<@{}>", user_id)
}

pub fn role_mention(role_id: u64) -> String {
    format!("<@&{}>", role_id)
}

/// Renders a unix timestamp as the platform's full date/time tag.
pub fn time_tag(unix_seconds: i64) -> String {
    format!("<t:{}:F>", unix_seconds)
}

/// Points at a message the platform has accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<u64>,
}

impl MessageRef {
    pub fn new(guild_id: u64, channel_id: u64, message_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
            message_id,
            author_id: None,
        }
    }

    pub fn jump_url(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }
}

/// An interactive button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub custom_id: String,
    pub label: String,
    pub disabled: bool,
}

impl Control {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            disabled: false,
        }
    }
}

/// Message body plus its interactive controls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Control>,
}

impl Outbound {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    /// Same message with every control greyed out.
    pub fn disabled(&self) -> Self {
        Self {
            content: self.content.clone(),
            controls: self
                .controls
                .iter()
                .map(|c| Control {
                    disabled: true,
                    ..c.clone()
                })
                .collect(),
        }
    }
}

/// Send/edit primitives provided by the platform runtime.
///
/// Implementations map a recipient who refuses direct messages to
/// [`DispatchError::NotificationUndeliverable`](crate::error::DispatchError::NotificationUndeliverable)
/// and a deleted or unknown target message to
/// [`DispatchError::StaleReference`](crate::error::DispatchError::StaleReference).
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Post a new message in a channel.
    async fn post(&self, guild_id: u64, channel_id: u64, message: Outbound) -> Result<MessageRef>;

    /// Post a message linked as a reply to `target`.
    async fn reply(&self, target: &MessageRef, message: Outbound) -> Result<MessageRef>;

    /// Replace the body and controls of a previously posted message.
    async fn edit(&self, target: &MessageRef, message: Outbound) -> Result<()>;

    /// Send a direct message to a user.
    async fn direct_message(&self, user_id: u64, message: Outbound) -> Result<()>;

    /// Reply visible only to `user_id`.
    async fn ephemeral(&self, channel_id: u64, user_id: u64, content: String) -> Result<()>;

    /// Add a reaction to a message.
    async fn react(&self, target: &MessageRef, emoji: &str) -> Result<()>;
}
