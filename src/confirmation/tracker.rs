use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditEvent, AuditLog};
use crate::confirmation::ticket::{Ticket, TicketId, TicketState};
use crate::error::{DispatchError, Result};
use crate::platform::{role_mention, MessageRef, Messenger, Outbound};
use crate::scheduler::Assignment;

/// How long a closed ticket is kept for late clicks.
const CLOSED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

struct TrackerInner {
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    messenger: Arc<dyn Messenger>,
    audit: AuditLog,
    window: Duration,
    escalation_role_id: Option<u64>,
}

/// Owns every outstanding confirmation ticket and its expiry timer.
///
/// State changes happen under the ticket map lock, so a worker click racing
/// the timer resolves to whichever takes the lock first; the other sees
/// [`DispatchError::TicketClosed`]. Notices are sent after the lock is
/// released.
#[derive(Clone)]
pub struct ConfirmationTracker {
    inner: Arc<TrackerInner>,
}

impl ConfirmationTracker {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        audit: AuditLog,
        window: Duration,
        escalation_role_id: Option<u64>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                tickets: Mutex::new(HashMap::new()),
                messenger,
                audit,
                window,
                escalation_role_id,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Starts tracking `assignment`, whose record has already been posted
    /// with the ticket's controls, and arms the expiry timer. The deadline
    /// runs from `assigned_at`, not from when the record post returned.
    pub async fn open(
        &self,
        id: TicketId,
        assignment: Assignment,
        assigned_at: Instant,
        record: MessageRef,
        record_body: Outbound,
    ) {
        let cancel = CancellationToken::new();
        let worker_id = assignment.worker_id;
        {
            let mut tickets = self.inner.tickets.lock().await;
            tickets.retain(|_, t| match t.closed_at {
                Some(closed) => closed.elapsed() < CLOSED_RETENTION,
                None => true,
            });
            tickets.insert(
                id,
                Ticket::new(id, assignment, record, record_body, cancel.clone()),
            );
        }
        tracing::debug!(ticket_id = %id, worker_id, window_secs = self.inner.window.as_secs(), "Ticket opened");

        let tracker = self.clone();
        let deadline = assigned_at + self.inner.window;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::trace!(ticket_id = %id, "Expiry timer cancelled");
                }
                _ = tokio::time::sleep_until(deadline) => {
                    match tracker.expire(id).await {
                        Ok(()) => {}
                        Err(DispatchError::TicketClosed) => {
                            tracing::debug!(ticket_id = %id, "Ticket closed before expiry");
                        }
                        Err(e) => tracing::warn!(ticket_id = %id, error = %e, "Expiry failed"),
                    }
                }
            }
        });
    }

    pub async fn state(&self, id: TicketId) -> Option<TicketState> {
        self.inner.tickets.lock().await.get(&id).map(|t| t.state.clone())
    }

    pub async fn pending_count(&self) -> usize {
        self.inner
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| !t.state.is_terminal())
            .count()
    }

    /// Worker acknowledges receipt, attesting the file name they received.
    pub async fn confirm(&self, id: TicketId, actor_id: u64, file_name: String) -> Result<()> {
        let file_name = file_name.trim().to_string();
        let (assignment, record, body) = self
            .transition(id, |t| t.confirm(actor_id, file_name.clone()))
            .await?;

        self.disable_controls(&record, &body).await;
        let text = format!(
            "✅ <@{}> confirmed receipt of the **{}** assigned at {}.\nFile name: `{}`",
            assignment.worker_id,
            assignment.file_type,
            assignment.time_tag(),
            file_name
        );
        self.post_linked(&record, text).await;
        Ok(())
    }

    /// Worker reports the file never arrived.
    pub async fn decline(&self, id: TicketId, actor_id: u64) -> Result<()> {
        let (assignment, record, body) = self.transition(id, |t| t.decline(actor_id)).await?;

        self.disable_controls(&record, &body).await;
        let text = format!(
            "❌ {}<@{}> reports the **{}** assigned at {} was NOT received.",
            self.escalation_prefix(),
            assignment.worker_id,
            assignment.file_type,
            assignment.time_tag()
        );
        self.post_linked(&record, text).await;
        Ok(())
    }

    /// Deadline transition. Called by the ticket's timer; a ticket that is
    /// already closed yields [`DispatchError::TicketClosed`] and no notice.
    pub async fn expire(&self, id: TicketId) -> Result<()> {
        let (assignment, record, body) = self.transition(id, |t| t.expire()).await?;

        tracing::warn!(
            ticket_id = %id,
            worker_id = assignment.worker_id,
            file_type = %assignment.file_type,
            "Assignment not confirmed in time"
        );
        self.disable_controls(&record, &body).await;
        let text = format!(
            "⏰ {}<@{}> has not confirmed the **{}** assigned at {} within {} minutes.",
            self.escalation_prefix(),
            assignment.worker_id,
            assignment.file_type,
            assignment.time_tag(),
            self.inner.window.as_secs() / 60
        );
        self.post_linked(&record, text).await;
        self.inner
            .audit
            .emit(
                record.guild_id,
                AuditEvent::ConfirmationTimedOut {
                    worker_id: assignment.worker_id,
                    file_type: assignment.file_type,
                },
            )
            .await;
        Ok(())
    }

    async fn transition<F>(&self, id: TicketId, apply: F) -> Result<(Assignment, MessageRef, Outbound)>
    where
        F: FnOnce(&mut Ticket) -> Result<()>,
    {
        let mut tickets = self.inner.tickets.lock().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| DispatchError::StaleReference(format!("confirmation ticket {}", id)))?;
        apply(ticket)?;
        Ok((
            ticket.assignment.clone(),
            ticket.record.clone(),
            ticket.record_body.clone(),
        ))
    }

    fn escalation_prefix(&self) -> String {
        match self.inner.escalation_role_id {
            Some(role) => format!("{} ", role_mention(role)),
            None => String::new(),
        }
    }

    async fn disable_controls(&self, record: &MessageRef, body: &Outbound) {
        if let Err(e) = self.inner.messenger.edit(record, body.disabled()).await {
            tracing::debug!(message_id = record.message_id, error = %e, "Could not disable ticket controls");
        }
    }

    /// Replies to the record, or posts unlinked in its channel when the
    /// record is gone.
    async fn post_linked(&self, record: &MessageRef, text: String) {
        let messenger = &self.inner.messenger;
        match messenger.reply(record, Outbound::text(text.clone())).await {
            Ok(_) => {}
            Err(DispatchError::StaleReference(_)) => {
                tracing::info!(message_id = record.message_id, "Assignment record gone, posting unlinked notice");
                if let Err(e) = messenger
                    .post(record.guild_id, record.channel_id, Outbound::text(text))
                    .await
                {
                    tracing::error!(channel_id = record.channel_id, error = %e, "Failed to post ticket notice");
                }
            }
            Err(e) => {
                tracing::error!(message_id = record.message_id, error = %e, "Failed to post ticket notice");
            }
        }
    }
}
