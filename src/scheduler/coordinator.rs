use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::audit::{AuditEvent, AuditLog};
use crate::auth::AuthorizationGate;
use crate::config::DispatchConfig;
use crate::confirmation::{ConfirmationTracker, TicketAction, TicketId};
use crate::error::{DispatchError, Result};
use crate::platform::{Member, MessageRef, Messenger, Outbound};
use crate::scheduler::cooldown::CooldownStore;
use crate::scheduler::queue::{EnqueueOutcome, QueueEntry, QueueSnapshot, QueueStore};
use crate::scheduler::tat::{parse_duration, TimeBudget};
use crate::scheduler::{Assignment, FileType};

/// Where a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl Origin {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignRequest {
    pub file_type: FileType,
    pub file_name: Option<String>,
    /// Raw `HH:MM:SS`/`MM:SS` text; unparseable input only drops the budget
    pub duration: Option<String>,
    /// Message the assignment was triggered from (reaction path)
    pub source_message: Option<MessageRef>,
}

impl AssignRequest {
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            file_name: None,
            duration: None,
            source_message: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn from_message(mut self, message: MessageRef) -> Self {
        self.source_message = Some(message);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    DirectMessage,
    /// DMs refused; a public notice was posted instead
    PublicFallback,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub assignment: Assignment,
    pub ticket_id: TicketId,
    pub record: MessageRef,
    pub budget: Option<TimeBudget>,
    pub delivery: Delivery,
    pub audited: bool,
}

impl AssignmentResult {
    pub fn was_dequeued(&self) -> bool {
        self.assignment.was_dequeued
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub position: usize,
    pub origin_reference: Option<String>,
}

/// Runs every queue and assignment operation.
///
/// Handlers are serialized by the dispatcher, so the queue lock is never
/// contended by two handlers at once; the confirmation timers are the only
/// concurrent actors and they never touch the queue.
pub struct AssignmentCoordinator {
    config: DispatchConfig,
    gate: AuthorizationGate,
    queue: Mutex<QueueStore>,
    cooldowns: Mutex<CooldownStore>,
    tracker: ConfirmationTracker,
    messenger: Arc<dyn Messenger>,
    audit: AuditLog,
}

impl AssignmentCoordinator {
    pub fn new(
        config: DispatchConfig,
        queue: QueueStore,
        messenger: Arc<dyn Messenger>,
        audit: AuditLog,
    ) -> Self {
        let tracker = ConfirmationTracker::new(
            messenger.clone(),
            audit.clone(),
            config.confirmation_window,
            config.escalation_role_id,
        );
        Self {
            gate: AuthorizationGate::from_config(&config),
            cooldowns: Mutex::new(CooldownStore::new(config.availability_cooldown)),
            queue: Mutex::new(queue),
            config,
            tracker,
            messenger,
            audit,
        }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        &self.tracker
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Hands a file to `worker`.
    ///
    /// Succeeds once the worker is dequeued and the public record with its
    /// confirmation ticket exists. Notifying the worker and auditing are
    /// best-effort and reported in the result.
    pub async fn assign(
        &self,
        actor: &Member,
        worker: &Member,
        origin: Origin,
        request: AssignRequest,
    ) -> Result<AssignmentResult> {
        self.gate.require(actor)?;
        if worker.is_bot {
            return Err(DispatchError::BotTarget);
        }

        // The entry stays queued until the record exists.
        let was_dequeued = self.queue.lock().await.position(worker.id).is_some();

        let budget = match request.duration.as_deref() {
            Some(text) => match parse_duration(text) {
                Ok(secs) => Some(TimeBudget::compute(request.file_type, secs)),
                Err(e) => {
                    tracing::info!(worker_id = worker.id, error = %e, "Ignoring unparseable duration");
                    None
                }
            },
            None => None,
        };

        let assignment = Assignment {
            worker_id: worker.id,
            file_type: request.file_type,
            file_name: request
                .file_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            declared_duration: request.duration,
            assigned_at: Utc::now(),
            assigner_id: actor.id,
            was_dequeued,
        };
        let assigned_instant = Instant::now();

        let ticket_id = TicketId::new();
        let mut body = Outbound::text(assignment.record_text(budget.as_ref()));
        for control in TicketAction::controls(ticket_id) {
            body = body.with_control(control);
        }
        let record = self
            .messenger
            .post(origin.guild_id, origin.channel_id, body.clone())
            .await?;
        if was_dequeued {
            self.queue.lock().await.remove(worker.id).into_outcome();
        }
        self.tracker
            .open(ticket_id, assignment.clone(), assigned_instant, record.clone(), body)
            .await;

        tracing::info!(
            worker_id = worker.id,
            assigner_id = actor.id,
            file_type = %assignment.file_type,
            was_dequeued,
            ticket_id = %ticket_id,
            "File assigned"
        );

        let delivery = self.notify_assignee(&assignment, budget.as_ref(), &record, origin).await;
        if delivery == Delivery::DirectMessage {
            if let Some(source) = &request.source_message {
                if let Err(e) = self.messenger.react(source, "✅").await {
                    tracing::debug!(error = %e, "Could not mark source message");
                }
            }
        }

        let audited = self
            .audit
            .emit(
                origin.guild_id,
                AuditEvent::Assigned {
                    editor_id: worker.id,
                    file_type: assignment.file_type,
                    file_name: assignment.file_name.clone(),
                    assigner_id: actor.id,
                    was_dequeued,
                },
            )
            .await;

        Ok(AssignmentResult {
            assignment,
            ticket_id,
            record,
            budget,
            delivery,
            audited,
        })
    }

    async fn notify_assignee(
        &self,
        assignment: &Assignment,
        budget: Option<&TimeBudget>,
        record: &MessageRef,
        origin: Origin,
    ) -> Delivery {
        let notice = Outbound::text(assignment.notice_text(budget, record));
        match self
            .messenger
            .direct_message(assignment.worker_id, notice)
            .await
        {
            Ok(()) => Delivery::DirectMessage,
            Err(DispatchError::NotificationUndeliverable(_)) => {
                tracing::info!(worker_id = assignment.worker_id, "DMs closed, posting public fallback");
                match self
                    .messenger
                    .post(
                        origin.guild_id,
                        origin.channel_id,
                        Outbound::text(assignment.fallback_text()),
                    )
                    .await
                {
                    Ok(_) => Delivery::PublicFallback,
                    Err(e) => {
                        tracing::error!(worker_id = assignment.worker_id, error = %e, "Fallback notice failed");
                        Delivery::Failed
                    }
                }
            }
            Err(e) => {
                tracing::warn!(worker_id = assignment.worker_id, error = %e, "Assignment DM failed");
                Delivery::Failed
            }
        }
    }

    /// Public: the worker marks themselves available.
    ///
    /// `source_message` is set on the legacy plain-text path; that message
    /// becomes the entry's origin instead of a freshly posted record.
    pub async fn request_availability(
        &self,
        worker: &Member,
        time_block: &str,
        origin: Origin,
        source_message: Option<MessageRef>,
    ) -> Result<Availability> {
        {
            let queue = self.queue.lock().await;
            if let (Some(position), Some(entry)) = (queue.position(worker.id), queue.get(worker.id)) {
                return Err(DispatchError::AlreadyQueued {
                    worker_id: worker.id,
                    position,
                    jump_url: entry.origin_reference.clone(),
                });
            }
        }

        {
            let mut cooldowns = self.cooldowns.lock().await;
            cooldowns.purge();
            if let Some(left) = cooldowns.remaining(worker.id) {
                return Err(DispatchError::CooldownActive {
                    retry_after_secs: left.as_secs().max(1),
                });
            }
            cooldowns.touch(worker.id);
        }

        let time_block = time_block.trim();
        let origin_reference = match &source_message {
            Some(message) => {
                if let Err(e) = self.messenger.react(message, "✅").await {
                    tracing::debug!(error = %e, "Could not acknowledge availability message");
                }
                Some(message.jump_url())
            }
            None => {
                let text = format!(
                    "🟢 {} is available for work ({})",
                    worker.mention(),
                    time_block
                );
                match self
                    .messenger
                    .post(origin.guild_id, origin.channel_id, Outbound::text(text))
                    .await
                {
                    Ok(record) => Some(record.jump_url()),
                    Err(e) => {
                        tracing::warn!(worker_id = worker.id, error = %e, "Availability record not posted");
                        None
                    }
                }
            }
        };

        let entry = QueueEntry::new(
            worker.id,
            worker.display_name.clone(),
            time_block,
            origin_reference.clone(),
        );
        let position = match self.queue.lock().await.enqueue(entry).into_outcome() {
            EnqueueOutcome::Queued { position } => position,
            EnqueueOutcome::AlreadyQueued { position, existing } => {
                return Err(DispatchError::AlreadyQueued {
                    worker_id: worker.id,
                    position,
                    jump_url: existing.origin_reference,
                })
            }
        };

        let reminder = format!(
            "You are now #{} in the queue ({}). Stay reachable; a coordinator will assign you a file. \
             Use `/optout` if you become unavailable.",
            position, time_block
        );
        if let Err(e) = self
            .messenger
            .direct_message(worker.id, Outbound::text(reminder))
            .await
        {
            tracing::debug!(worker_id = worker.id, error = %e, "Queue reminder not delivered");
        }

        self.audit
            .emit(
                origin.guild_id,
                AuditEvent::Queued {
                    worker_id: worker.id,
                    time_block: time_block.to_string(),
                    added_by: None,
                },
            )
            .await;

        Ok(Availability {
            position,
            origin_reference,
        })
    }

    /// Public: the worker leaves the queue.
    pub async fn opt_out(&self, worker: &Member, origin: Origin) -> Result<()> {
        if !self.queue.lock().await.remove(worker.id).into_outcome() {
            return Err(DispatchError::NotQueued(worker.id));
        }
        self.announce(origin, format!("⚪ {} left the queue.", worker.mention()))
            .await;
        self.audit
            .emit(origin.guild_id, AuditEvent::OptedOut { worker_id: worker.id })
            .await;
        Ok(())
    }

    /// Coordinator enqueue of another worker; skips the cooldown.
    pub async fn add_to_queue(
        &self,
        actor: &Member,
        worker: &Member,
        time_block: &str,
        origin: Origin,
    ) -> Result<usize> {
        self.gate.require(actor)?;
        let time_block = time_block.trim();
        let entry = QueueEntry::new(worker.id, worker.display_name.clone(), time_block, None);
        let position = match self.queue.lock().await.enqueue(entry).into_outcome() {
            EnqueueOutcome::Queued { position } => position,
            EnqueueOutcome::AlreadyQueued { position, existing } => {
                return Err(DispatchError::AlreadyQueued {
                    worker_id: worker.id,
                    position,
                    jump_url: existing.origin_reference,
                })
            }
        };

        self.announce(
            origin,
            format!(
                "🟢 {} was added to the queue by {} ({}), position #{}.",
                worker.mention(),
                actor.mention(),
                time_block,
                position
            ),
        )
        .await;
        self.audit
            .emit(
                origin.guild_id,
                AuditEvent::Queued {
                    worker_id: worker.id,
                    time_block: time_block.to_string(),
                    added_by: Some(actor.id),
                },
            )
            .await;
        Ok(position)
    }

    pub async fn list_queue(&self, actor: &Member, limit: usize) -> Result<QueueSnapshot> {
        self.gate.require(actor)?;
        Ok(self.queue.lock().await.snapshot(limit))
    }

    pub async fn force_remove(&self, actor: &Member, worker: &Member, origin: Origin) -> Result<()> {
        self.gate.require(actor)?;
        if !self.queue.lock().await.remove(worker.id).into_outcome() {
            return Err(DispatchError::NotQueued(worker.id));
        }
        self.announce(
            origin,
            format!(
                "🔴 {} was removed from the queue by {}.",
                worker.mention(),
                actor.mention()
            ),
        )
        .await;
        self.audit
            .emit(
                origin.guild_id,
                AuditEvent::ForceRemoved {
                    worker_id: worker.id,
                    removed_by: actor.id,
                },
            )
            .await;
        Ok(())
    }

    /// Returns how many entries were cleared.
    pub async fn reset_queue(&self, actor: &Member, origin: Origin) -> Result<usize> {
        self.gate.require(actor)?;
        let removed = self.queue.lock().await.clear().into_outcome();
        self.announce(
            origin,
            format!("🧹 The queue was reset by {} ({} cleared).", actor.mention(), removed),
        )
        .await;
        self.audit
            .emit(
                origin.guild_id,
                AuditEvent::QueueReset {
                    removed,
                    reset_by: actor.id,
                },
            )
            .await;
        Ok(removed)
    }

    /// Points the guild's audit mirror at `channel_id`.
    pub async fn set_audit_channel(&self, actor: &Member, guild_id: u64, channel_id: u64) -> Result<()> {
        self.gate.require(actor)?;
        let written = self.audit.set_channel(guild_id, channel_id).await;
        if let Some(e) = &written.persist_error {
            tracing::error!(guild_id, error = %e, "Log channel set in memory only");
        }
        tracing::info!(guild_id, channel_id, "Log channel configured");
        self.audit
            .emit(
                guild_id,
                AuditEvent::LogChannelSet {
                    channel_id,
                    set_by: actor.id,
                },
            )
            .await;
        Ok(())
    }

    /// Pings a worker, publicly and by DM, for a progress update.
    pub async fn ask_for_update(&self, actor: &Member, worker: &Member, origin: Origin) -> Result<()> {
        self.gate.require(actor)?;
        let text = format!(
            "🔔 {}, {} is asking for an update on your file.",
            worker.mention(),
            actor.mention()
        );
        self.announce(origin, text.clone()).await;
        if let Err(e) = self
            .messenger
            .direct_message(worker.id, Outbound::text(text))
            .await
        {
            tracing::debug!(worker_id = worker.id, error = %e, "Update request DM not delivered");
        }
        self.audit
            .emit(
                origin.guild_id,
                AuditEvent::UpdateRequested {
                    worker_id: worker.id,
                    requested_by: actor.id,
                },
            )
            .await;
        Ok(())
    }

    async fn announce(&self, origin: Origin, text: String) {
        if let Err(e) = self
            .messenger
            .post(origin.guild_id, origin.channel_id, Outbound::text(text))
            .await
        {
            tracing::warn!(channel_id = origin.channel_id, error = %e, "Announcement not posted");
        }
    }
}

/// Public TAT calculator.
pub fn tat_timer(file_type: &str, duration: &str) -> Result<(FileType, TimeBudget)> {
    let file_type: FileType = file_type.parse()?;
    let seconds = parse_duration(duration)?;
    Ok((file_type, TimeBudget::compute(file_type, seconds)))
}

/// Human-readable queue listing with an overflow line.
pub fn render_queue(snapshot: &QueueSnapshot) -> String {
    if snapshot.total == 0 {
        return "The queue is empty.".to_string();
    }
    let mut text = format!("**Queue ({} waiting)**", snapshot.total);
    for (i, entry) in snapshot.entries.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. <@{}> ({}) since <t:{}:R>",
            i + 1,
            entry.worker_id,
            entry.time_block,
            entry.enqueued_at.timestamp()
        ));
    }
    if snapshot.remaining() > 0 {
        text.push_str(&format!("\n...and {} more", snapshot.remaining()));
    }
    text
}
