pub mod assignment;
pub mod cooldown;
pub mod coordinator;
pub mod file_type;
pub mod queue;
pub mod tat;

pub use assignment::Assignment;
pub use coordinator::{AssignRequest, AssignmentCoordinator, AssignmentResult, Delivery, Origin};
pub use file_type::FileType;
pub use queue::{QueueEntry, QueueSnapshot, QueueStore};
pub use tat::TimeBudget;
