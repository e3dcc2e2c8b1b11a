use std::collections::HashSet;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::platform::Member;

/// Decides who may run coordinator operations.
///
/// An actor qualifies when their own id, any of their role ids, or any of
/// their role names is in the configured set. Plain membership, no role
/// hierarchy.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    ids: HashSet<u64>,
    role_names: HashSet<String>,
}

impl AuthorizationGate {
    pub fn new(
        ids: impl IntoIterator<Item = u64>,
        role_names: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            role_names: role_names.into_iter().collect(),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            config.coordinator_ids.iter().copied(),
            config.coordinator_role_names.iter().cloned(),
        )
    }

    pub fn is_coordinator(&self, actor: &Member) -> bool {
        self.ids.contains(&actor.id)
            || actor.role_ids.iter().any(|id| self.ids.contains(id))
            || actor.role_names.iter().any(|name| self.role_names.contains(name))
    }

    pub fn require(&self, actor: &Member) -> Result<()> {
        if self.is_coordinator(actor) {
            Ok(())
        } else {
            tracing::debug!(actor_id = actor.id, "Coordinator check failed");
            Err(DispatchError::Unauthorized)
        }
    }
}
