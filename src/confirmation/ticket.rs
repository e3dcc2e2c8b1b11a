use std::str::FromStr;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::platform::{Control, MessageRef, Outbound};
use crate::scheduler::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TicketId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketState {
    Pending,
    Confirmed { file_name: String },
    Declined,
    TimedOut,
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketState::Pending)
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketState::Pending => write!(f, "pending"),
            TicketState::Confirmed { .. } => write!(f, "confirmed"),
            TicketState::Declined => write!(f, "declined"),
            TicketState::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Worker-facing buttons on an assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    Confirm(TicketId),
    Decline(TicketId),
}

impl TicketAction {
    const CONFIRM_PREFIX: &'static str = "confirm:";
    const DECLINE_PREFIX: &'static str = "decline:";

    pub fn controls(id: TicketId) -> [Control; 2] {
        [
            Control::new(format!("{}{}", Self::CONFIRM_PREFIX, id), "✅ Confirm receipt"),
            Control::new(format!("{}{}", Self::DECLINE_PREFIX, id), "❌ Not received"),
        ]
    }

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        if let Some(rest) = custom_id.strip_prefix(Self::CONFIRM_PREFIX) {
            return rest.parse().ok().map(TicketAction::Confirm);
        }
        if let Some(rest) = custom_id.strip_prefix(Self::DECLINE_PREFIX) {
            return rest.parse().ok().map(TicketAction::Decline);
        }
        None
    }
}

/// Acknowledgment tracker for one assignment.
///
/// Exactly one terminal transition is accepted. Worker transitions also
/// cancel the expiry timer through `cancel`.
#[derive(Debug)]
pub struct Ticket {
    pub id: TicketId,
    pub assignment: Assignment,
    pub record: MessageRef,
    pub record_body: Outbound,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
    pub state: TicketState,
    cancel: CancellationToken,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        assignment: Assignment,
        record: MessageRef,
        record_body: Outbound,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            assignment,
            record,
            record_body,
            opened_at: Instant::now(),
            closed_at: None,
            state: TicketState::Pending,
            cancel,
        }
    }

    pub fn owner(&self) -> u64 {
        self.assignment.worker_id
    }

    pub fn confirm(&mut self, actor_id: u64, file_name: String) -> Result<()> {
        self.check_owner(actor_id)?;
        self.close(TicketState::Confirmed { file_name })?;
        self.cancel.cancel();
        Ok(())
    }

    pub fn decline(&mut self, actor_id: u64) -> Result<()> {
        self.check_owner(actor_id)?;
        self.close(TicketState::Declined)?;
        self.cancel.cancel();
        Ok(())
    }

    /// Deadline transition; only the timer drives it.
    pub fn expire(&mut self) -> Result<()> {
        self.close(TicketState::TimedOut)
    }

    fn check_owner(&self, actor_id: u64) -> Result<()> {
        if actor_id == self.owner() {
            Ok(())
        } else {
            Err(DispatchError::WrongWorker {
                owner: self.owner(),
            })
        }
    }

    fn close(&mut self, next: TicketState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DispatchError::TicketClosed);
        }
        tracing::info!(ticket_id = %self.id, worker_id = self.owner(), state = %next, "Ticket closed");
        self.state = next;
        self.closed_at = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FileType;
    use chrono::Utc;

    fn ticket(token: CancellationToken) -> Ticket {
        let assignment = Assignment {
            worker_id: 10,
            file_type: FileType::Hp,
            file_name: None,
            declared_duration: None,
            assigned_at: Utc::now(),
            assigner_id: 1,
            was_dequeued: false,
        };
        Ticket::new(
            TicketId::new(),
            assignment,
            MessageRef::new(1, 2, 3),
            Outbound::text("record"),
            token,
        )
    }

    #[tokio::test]
    async fn confirm_closes_and_cancels_timer() {
        let token = CancellationToken::new();
        let mut t = ticket(token.clone());
        t.confirm(10, "ACME".to_string()).unwrap();
        assert_eq!(
            t.state,
            TicketState::Confirmed {
                file_name: "ACME".to_string()
            }
        );
        assert!(token.is_cancelled());
        assert!(t.closed_at.is_some());
    }

    #[tokio::test]
    async fn other_actor_cannot_transition() {
        let token = CancellationToken::new();
        let mut t = ticket(token.clone());
        assert!(matches!(
            t.confirm(99, "x".to_string()),
            Err(DispatchError::WrongWorker { owner: 10 })
        ));
        assert!(matches!(t.decline(99), Err(DispatchError::WrongWorker { .. })));
        assert_eq!(t.state, TicketState::Pending);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn only_first_transition_wins() {
        let mut t = ticket(CancellationToken::new());
        t.decline(10).unwrap();
        assert!(matches!(t.expire(), Err(DispatchError::TicketClosed)));
        assert!(matches!(
            t.confirm(10, "late".to_string()),
            Err(DispatchError::TicketClosed)
        ));
        assert_eq!(t.state, TicketState::Declined);
    }

    #[tokio::test]
    async fn expire_leaves_token_alone() {
        let token = CancellationToken::new();
        let mut t = ticket(token.clone());
        t.expire().unwrap();
        assert_eq!(t.state, TicketState::TimedOut);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn control_ids_round_trip() {
        let id = TicketId::new();
        let [confirm, decline] = TicketAction::controls(id);
        assert_eq!(
            TicketAction::from_custom_id(&confirm.custom_id),
            Some(TicketAction::Confirm(id))
        );
        assert_eq!(
            TicketAction::from_custom_id(&decline.custom_id),
            Some(TicketAction::Decline(id))
        );
        assert_eq!(TicketAction::from_custom_id("confirm:not-a-uuid"), None);
        assert_eq!(TicketAction::from_custom_id("review:approve:x"), None);
    }
}
