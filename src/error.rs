use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("You need a coordinator role to do that")]
    Unauthorized,

    #[error("<@{worker_id}> is already in the queue (position {position}){}", jump_suffix(.jump_url))]
    AlreadyQueued {
        worker_id: u64,
        position: usize,
        jump_url: Option<String>,
    },

    #[error("<@{0}> is not in the queue")]
    NotQueued(u64),

    #[error("Invalid duration {0:?}, expected HH:MM:SS or MM:SS with minutes and seconds below 60")]
    InvalidDuration(String),

    #[error("Unknown file type {0:?}")]
    UnknownFileType(String),

    #[error("Please wait {retry_after_secs}s before marking yourself available again")]
    CooldownActive { retry_after_secs: u64 },

    #[error("Cannot send a direct message to <@{0}>")]
    NotificationUndeliverable(u64),

    #[error("Failed to persist {what}: {reason}")]
    PersistenceWriteFailed { what: String, reason: String },

    #[error("Referenced message no longer exists: {0}")]
    StaleReference(String),

    #[error("Only <@{owner}> can respond to this assignment")]
    WrongWorker { owner: u64 },

    #[error("This is no longer actionable")]
    TicketClosed,

    #[error("Cannot assign work to a bot account")]
    BotTarget,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field {field} exceeds {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("Platform error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn jump_suffix(jump_url: &Option<String>) -> String {
    match jump_url {
        Some(url) => format!(": {}", url),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
