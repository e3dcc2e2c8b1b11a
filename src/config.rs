use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COORDINATOR_ROLE: &str = "Senior Workflow Coordinator";

/// Runtime configuration for the dispatcher.
///
/// Everything is fixed at startup; the per-guild audit channel is the only
/// setting that changes at runtime and lives in its own store.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Directory holding `queue.json` and `guild_config.json`
    pub data_dir: PathBuf,
    /// Role names that grant coordinator rights
    pub coordinator_role_names: Vec<String>,
    /// User or role ids that grant coordinator rights
    pub coordinator_ids: Vec<u64>,
    /// Minimum gap between two availability requests from one worker
    pub availability_cooldown: Duration,
    /// How long a worker has to confirm an assignment
    pub confirmation_window: Duration,
    /// Entries shown by a queue listing before "...and N more"
    pub queue_display_limit: usize,
    /// Role pinged when a confirmation times out
    pub escalation_role_id: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            coordinator_role_names: vec![DEFAULT_COORDINATOR_ROLE.to_string()],
            coordinator_ids: Vec::new(),
            availability_cooldown: Duration::from_secs(600),
            confirmation_window: Duration::from_secs(300),
            queue_display_limit: 25,
            escalation_role_id: None,
        }
    }
}

impl DispatchConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }

    pub fn guild_config_path(&self) -> PathBuf {
        self.data_dir.join("guild_config.json")
    }

    pub fn with_coordinator_role(mut self, name: impl Into<String>) -> Self {
        self.coordinator_role_names.push(name.into());
        self
    }

    pub fn with_coordinator_id(mut self, id: u64) -> Self {
        self.coordinator_ids.push(id);
        self
    }

    pub fn with_availability_cooldown(mut self, cooldown: Duration) -> Self {
        self.availability_cooldown = cooldown;
        self
    }

    pub fn with_confirmation_window(mut self, window: Duration) -> Self {
        self.confirmation_window = window;
        self
    }

    pub fn with_escalation_role(mut self, role_id: u64) -> Self {
        self.escalation_role_id = Some(role_id);
        self
    }
}
