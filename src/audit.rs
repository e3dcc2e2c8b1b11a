//! Best-effort mirror of coordinator actions into each guild's log channel.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::platform::{mention, Messenger, Outbound};
use crate::scheduler::FileType;
use crate::storage::{GuildConfigStore, Written};

/// Something worth recording in the audit channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    Assigned {
        editor_id: u64,
        file_type: FileType,
        file_name: Option<String>,
        assigner_id: u64,
        was_dequeued: bool,
    },
    Queued {
        worker_id: u64,
        time_block: String,
        added_by: Option<u64>,
    },
    OptedOut {
        worker_id: u64,
    },
    ForceRemoved {
        worker_id: u64,
        removed_by: u64,
    },
    QueueReset {
        removed: usize,
        reset_by: u64,
    },
    UpdateRequested {
        worker_id: u64,
        requested_by: u64,
    },
    ConfirmationTimedOut {
        worker_id: u64,
        file_type: FileType,
    },
    LogChannelSet {
        channel_id: u64,
        set_by: u64,
    },
    /// Pre-rendered body of a filed or resolved report.
    Report {
        body: String,
    },
}

impl AuditEvent {
    pub fn render(&self) -> String {
        match self {
            AuditEvent::Assigned {
                editor_id,
                file_type,
                file_name,
                assigner_id,
                was_dequeued,
            } => {
                let mut text = format!(
                    "📋 **Assignment**\nEditor: {}\nFile type: **{}**\n",
                    mention(*editor_id),
                    file_type
                );
                if let Some(name) = file_name {
                    text.push_str(&format!("File name: `{}`\n", name));
                }
                text.push_str(&format!(
                    "Assigned by: {}\nRemoved from queue: {}",
                    mention(*assigner_id),
                    if *was_dequeued { "yes" } else { "no" }
                ));
                text
            }
            AuditEvent::Queued {
                worker_id,
                time_block,
                added_by: None,
            } => format!("🟢 {} joined the queue ({})", mention(*worker_id), time_block),
            AuditEvent::Queued {
                worker_id,
                time_block,
                added_by: Some(by),
            } => format!(
                "🟢 {} was added to the queue by {} ({})",
                mention(*worker_id),
                mention(*by),
                time_block
            ),
            AuditEvent::OptedOut { worker_id } => {
                format!("⚪ {} left the queue", mention(*worker_id))
            }
            AuditEvent::ForceRemoved {
                worker_id,
                removed_by,
            } => format!(
                "🔴 {} was removed from the queue by {}",
                mention(*worker_id),
                mention(*removed_by)
            ),
            AuditEvent::QueueReset { removed, reset_by } => format!(
                "🧹 Queue reset by {} ({} entries cleared)",
                mention(*reset_by),
                removed
            ),
            AuditEvent::UpdateRequested {
                worker_id,
                requested_by,
            } => format!(
                "🔔 {} asked {} for a file update",
                mention(*requested_by),
                mention(*worker_id)
            ),
            AuditEvent::ConfirmationTimedOut {
                worker_id,
                file_type,
            } => format!(
                "⏰ {} did not confirm their **{}** in time",
                mention(*worker_id),
                file_type
            ),
            AuditEvent::LogChannelSet { channel_id, set_by } => format!(
                "📌 Log channel set to <#{}> by {}",
                channel_id,
                mention(*set_by)
            ),
            AuditEvent::Report { body } => body.clone(),
        }
    }
}

/// Posts [`AuditEvent`]s to the configured channel of each guild.
#[derive(Clone)]
pub struct AuditLog {
    channels: Arc<Mutex<GuildConfigStore>>,
    messenger: Arc<dyn Messenger>,
}

impl AuditLog {
    pub fn new(channels: GuildConfigStore, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            channels: Arc::new(Mutex::new(channels)),
            messenger,
        }
    }

    pub async fn channel_for(&self, guild_id: u64) -> Option<u64> {
        self.channels.lock().await.log_channel(guild_id)
    }

    pub async fn set_channel(&self, guild_id: u64, channel_id: u64) -> Written<Option<u64>> {
        self.channels.lock().await.set_log_channel(guild_id, channel_id)
    }

    /// Returns true when the event reached a log channel. Never fails the
    /// caller: an unconfigured guild or a send error is only logged.
    pub async fn emit(&self, guild_id: u64, event: AuditEvent) -> bool {
        let Some(channel_id) = self.channel_for(guild_id).await else {
            tracing::debug!(guild_id, "No log channel configured, audit event dropped");
            return false;
        };

        match self
            .messenger
            .post(guild_id, channel_id, Outbound::text(event.render()))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(guild_id, channel_id, error = %e, "Failed to mirror audit event");
                false
            }
        }
    }
}
