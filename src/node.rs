use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLog;
use crate::config::DispatchConfig;
use crate::confirmation::TicketAction;
use crate::error::{DispatchError, Result};
use crate::platform::{Member, MessageRef, Messenger};
use crate::reports::{ReportDesk, ReportKind, ReviewAction};
use crate::scheduler::coordinator::{render_queue, tat_timer};
use crate::scheduler::queue::UNSPECIFIED_TIME_BLOCK;
use crate::scheduler::{AssignRequest, AssignmentCoordinator, Delivery, FileType, Origin, QueueStore};
use crate::storage::GuildConfigStore;

/// One inbound platform event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub guild_id: u64,
    pub channel_id: u64,
    pub actor: Member,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Command(Command),
    /// Button press; `input` carries the modal text that some buttons collect
    Control {
        custom_id: String,
        #[serde(default)]
        input: Option<String>,
    },
    /// Plain channel message
    Message { message: MessageRef, content: String },
    /// Reaction added to `message`, which was written by `author`
    Reaction {
        message: MessageRef,
        author: Member,
        emoji: String,
    },
}

/// Slash commands and context-menu actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    Available {
        #[serde(default)]
        time_block: Option<String>,
    },
    Optout,
    Queue {
        #[serde(default)]
        limit: Option<usize>,
    },
    Remove {
        worker: Member,
    },
    Resetqueue,
    Assign {
        worker: Member,
        file_type: String,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        duration: Option<String>,
    },
    SetLogChannel,
    TatTimer {
        file_type: String,
        duration: String,
    },
    AddToQueue {
        worker: Member,
        #[serde(default)]
        time_block: Option<String>,
    },
    AskForUpdate {
        worker: Member,
    },
    Report {
        kind: ReportKind,
        fields: BTreeMap<String, String>,
    },
}

/// Private answer to the actor; `None` when the public output says it all.
pub type Reply = Option<String>;

/// Routes events to the coordinator and report desk, one at a time.
pub struct Dispatcher {
    coordinator: AssignmentCoordinator,
    reports: ReportDesk,
    messenger: Arc<dyn Messenger>,
    bot_user_id: Option<u64>,
}

impl Dispatcher {
    pub fn new(coordinator: AssignmentCoordinator, reports: ReportDesk, bot_user_id: Option<u64>) -> Self {
        Self {
            messenger: coordinator.messenger().clone(),
            coordinator,
            reports,
            bot_user_id,
        }
    }

    /// Builds the whole stack on top of loaded stores.
    pub fn build(
        config: DispatchConfig,
        queue: QueueStore,
        guild_config: GuildConfigStore,
        messenger: Arc<dyn Messenger>,
        bot_user_id: Option<u64>,
    ) -> Self {
        let audit = AuditLog::new(guild_config, messenger.clone());
        let coordinator = AssignmentCoordinator::new(config, queue, messenger.clone(), audit.clone());
        let reports = ReportDesk::new(coordinator.gate().clone(), messenger, audit);
        Self::new(coordinator, reports, bot_user_id)
    }

    pub fn coordinator(&self) -> &AssignmentCoordinator {
        &self.coordinator
    }

    pub fn reports(&self) -> &ReportDesk {
        &self.reports
    }

    /// Processes events in arrival order until the channel closes or
    /// `shutdown` fires.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Event stream closed");
                        break;
                    };
                    self.dispatch(event).await;
                }
            }
        }
    }

    /// Handles one event and delivers any private reply.
    pub async fn dispatch(&self, event: Event) {
        let channel_id = event.channel_id;
        let actor_id = event.actor.id;
        if let Some(text) = self.handle(event).await {
            if let Err(e) = self.messenger.ephemeral(channel_id, actor_id, text).await {
                tracing::warn!(actor_id, error = %e, "Private reply not delivered");
            }
        }
    }

    pub async fn handle(&self, event: Event) -> Reply {
        if Some(event.actor.id) == self.bot_user_id {
            return None;
        }
        let origin = Origin::new(event.guild_id, event.channel_id);
        let actor = event.actor;

        let outcome = match event.kind {
            EventKind::Command(command) => self.handle_command(&actor, origin, command).await,
            EventKind::Control { custom_id, input } => {
                self.handle_control(&actor, &custom_id, input).await
            }
            EventKind::Message { message, content } => {
                self.handle_message(&actor, origin, message, &content).await
            }
            EventKind::Reaction {
                message,
                author,
                emoji,
            } => self.handle_reaction(&actor, origin, message, &author, &emoji).await,
        };

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(actor_id = actor.id, error = %e, "Request rejected");
                Some(e.to_string())
            }
        }
    }

    async fn handle_command(&self, actor: &Member, origin: Origin, command: Command) -> Result<Reply> {
        let coordinator = &self.coordinator;
        match command {
            Command::Available { time_block } => {
                let block = time_block.unwrap_or_else(|| UNSPECIFIED_TIME_BLOCK.to_string());
                let availability = coordinator
                    .request_availability(actor, &block, origin, None)
                    .await?;
                Ok(Some(format!(
                    "You are #{} in the queue.",
                    availability.position
                )))
            }
            Command::Optout => {
                coordinator.opt_out(actor, origin).await?;
                Ok(Some("You have been removed from the queue.".to_string()))
            }
            Command::Queue { limit } => {
                let limit = limit.unwrap_or(coordinator.config().queue_display_limit);
                let snapshot = coordinator.list_queue(actor, limit).await?;
                Ok(Some(render_queue(&snapshot)))
            }
            Command::Remove { worker } => {
                coordinator.force_remove(actor, &worker, origin).await?;
                Ok(None)
            }
            Command::Resetqueue => {
                let removed = coordinator.reset_queue(actor, origin).await?;
                Ok(Some(format!("Cleared {} entries.", removed)))
            }
            Command::Assign {
                worker,
                file_type,
                file_name,
                duration,
            } => {
                let file_type: FileType = file_type.parse()?;
                let mut request = AssignRequest::new(file_type);
                request.file_name = file_name;
                request.duration = duration;
                let result = coordinator.assign(actor, &worker, origin, request).await?;
                Ok(Some(assignment_summary(&worker, &result)))
            }
            Command::SetLogChannel => {
                coordinator
                    .set_audit_channel(actor, origin.guild_id, origin.channel_id)
                    .await?;
                Ok(Some(format!(
                    "Log channel set to <#{}>.",
                    origin.channel_id
                )))
            }
            Command::TatTimer {
                file_type,
                duration,
            } => {
                let (file_type, budget) = tat_timer(&file_type, &duration)?;
                Ok(Some(format!(
                    "**{}** ({})\n{}",
                    file_type,
                    duration.trim(),
                    budget.describe()
                )))
            }
            Command::AddToQueue { worker, time_block } => {
                let block = time_block.unwrap_or_else(|| UNSPECIFIED_TIME_BLOCK.to_string());
                let position = coordinator.add_to_queue(actor, &worker, &block, origin).await?;
                Ok(Some(format!("{} is #{} in the queue.", worker.display_name, position)))
            }
            Command::AskForUpdate { worker } => {
                coordinator.ask_for_update(actor, &worker, origin).await?;
                Ok(Some(format!("Asked {} for an update.", worker.display_name)))
            }
            Command::Report { kind, fields } => {
                self.reports.file(actor, origin, kind, &fields).await?;
                Ok(Some("Report submitted.".to_string()))
            }
        }
    }

    async fn handle_control(&self, actor: &Member, custom_id: &str, input: Option<String>) -> Result<Reply> {
        if let Some(action) = TicketAction::from_custom_id(custom_id) {
            let tracker = self.coordinator.tracker();
            return match action {
                TicketAction::Confirm(id) => {
                    let file_name = input
                        .filter(|s| !s.trim().is_empty())
                        .ok_or_else(|| DispatchError::MissingField("File name".to_string()))?;
                    tracker.confirm(id, actor.id, file_name).await?;
                    Ok(Some("Thanks, receipt confirmed.".to_string()))
                }
                TicketAction::Decline(id) => {
                    tracker.decline(id, actor.id).await?;
                    Ok(Some("Coordinators have been told the file did not arrive.".to_string()))
                }
            };
        }

        if let Some(action) = ReviewAction::from_custom_id(custom_id) {
            let disposition = self.reports.resolve(actor, action).await?;
            return Ok(Some(format!("Marked {}.", disposition)));
        }

        Err(DispatchError::StaleReference(format!("control {}", custom_id)))
    }

    /// Legacy path: a bare "available" message queues its author.
    async fn handle_message(
        &self,
        actor: &Member,
        origin: Origin,
        message: MessageRef,
        content: &str,
    ) -> Result<Reply> {
        if actor.is_bot || !content.trim().eq_ignore_ascii_case("available") {
            return Ok(None);
        }
        let availability = self
            .coordinator
            .request_availability(actor, UNSPECIFIED_TIME_BLOCK, origin, Some(message))
            .await?;
        Ok(Some(format!("You are #{} in the queue.", availability.position)))
    }

    /// Legacy path: a coordinator reacts to a worker's message with a file
    /// type code or emoji to assign that file to the author.
    async fn handle_reaction(
        &self,
        actor: &Member,
        origin: Origin,
        message: MessageRef,
        author: &Member,
        emoji: &str,
    ) -> Result<Reply> {
        let Some(file_type) = FileType::from_reaction(emoji) else {
            return Ok(None);
        };
        if author.is_bot || !self.coordinator.gate().is_coordinator(actor) {
            return Ok(None);
        }
        let request = AssignRequest::new(file_type).from_message(message);
        let result = self.coordinator.assign(actor, author, origin, request).await?;
        Ok(Some(assignment_summary(author, &result)))
    }
}

fn assignment_summary(worker: &Member, result: &crate::scheduler::AssignmentResult) -> String {
    let delivery = match result.delivery {
        Delivery::DirectMessage => "notified by DM",
        Delivery::PublicFallback => "DMs closed, notified in channel",
        Delivery::Failed => "notification failed",
    };
    let mut text = format!(
        "Assigned **{}** to {} ({}).",
        result.assignment.file_type, worker.display_name, delivery
    );
    if result.was_dequeued() {
        text.push_str(" Removed from the queue.");
    }
    if result.assignment.declared_duration.is_some() && result.budget.is_none() {
        text.push_str(" Duration not understood, no TAT shown.");
    }
    text
}
