//! Assignment acknowledgment.
//!
//! Every assignment record carries a [`Ticket`] that starts `Pending` and
//! ends in exactly one of `Confirmed`, `Declined` or `TimedOut`:
//!
//! - **Confirmed / Declined**: driven by the assigned worker through the
//!   record's buttons. Cancels the expiry timer.
//! - **TimedOut**: driven by the per-ticket timer once the confirmation
//!   window elapses. Posts an escalation that replies to the record, or a
//!   plain channel message if the record was deleted.
//!
//! [`ConfirmationTracker`] owns the tickets and the timers.

pub mod ticket;
pub mod tracker;

pub use ticket::{Ticket, TicketAction, TicketId, TicketState};
pub use tracker::ConfirmationTracker;
