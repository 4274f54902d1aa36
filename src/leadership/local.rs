use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::CoordinationError;
use crate::leadership::{CoordinationService, LeaderLatchListener};

#[derive(Default)]
struct Group {
    candidates: Vec<u64>,
    leader: Option<u64>,
    listeners: Vec<(u64, Arc<dyn LeaderLatchListener>)>,
}

/// In-process election shared by the nodes of a single process.
///
/// Each node talks to it through a [`LocalCoordination`] handle. With
/// `auto_elect`, the first candidate registered at a path becomes its leader
/// and resigning hands leadership to the next candidate in registration order.
/// Listeners are notified only when leadership actually changes.
#[derive(Clone)]
pub struct LocalElection {
    auto_elect: bool,
    groups: Arc<Mutex<HashMap<String, Group>>>,
}

impl LocalElection {
    pub fn new(auto_elect: bool) -> Self {
        Self {
            auto_elect,
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle for node `node_id`.
    pub fn node(&self, node_id: u64) -> LocalCoordination {
        LocalCoordination {
            node_id,
            election: self.clone(),
        }
    }

    pub fn leader(&self, path: &str) -> Option<u64> {
        self.lock().get(path).and_then(|g| g.leader)
    }

    pub fn candidates(&self, path: &str) -> Vec<u64> {
        self.lock()
            .get(path)
            .map(|g| g.candidates.clone())
            .unwrap_or_default()
    }

    /// Make `node_id` the leader at `path`, demoting the previous leader.
    pub fn elect(&self, path: &str, node_id: u64) -> Result<(), CoordinationError> {
        let notifications = {
            let mut groups = self.lock();
            let group = groups
                .get_mut(path)
                .ok_or_else(|| CoordinationError::UnknownPath(path.to_string()))?;
            if !group.candidates.contains(&node_id) {
                return Err(CoordinationError::Unavailable(format!(
                    "node {} is not a candidate at {}",
                    node_id, path
                )));
            }
            Self::change_leader(group, Some(node_id))
        };
        Self::notify(path, notifications);
        Ok(())
    }

    /// Drop `node_id` as leader at `path`. The next candidate takes over when
    /// auto election is on; otherwise the path is left leaderless.
    pub fn resign(&self, path: &str, node_id: u64) -> Result<(), CoordinationError> {
        let notifications = {
            let mut groups = self.lock();
            let group = groups
                .get_mut(path)
                .ok_or_else(|| CoordinationError::UnknownPath(path.to_string()))?;
            if group.leader != Some(node_id) {
                return Ok(());
            }
            let next = if self.auto_elect {
                group.candidates.iter().copied().find(|&c| c != node_id)
            } else {
                None
            };
            Self::change_leader(group, next)
        };
        Self::notify(path, notifications);
        Ok(())
    }

    fn change_leader(group: &mut Group, next: Option<u64>) -> Vec<(Arc<dyn LeaderLatchListener>, bool)> {
        let previous = group.leader;
        if previous == next {
            return Vec::new();
        }
        group.leader = next;
        group
            .listeners
            .iter()
            .filter_map(|(id, listener)| {
                if Some(*id) == next {
                    Some((listener.clone(), true))
                } else if Some(*id) == previous {
                    Some((listener.clone(), false))
                } else {
                    None
                }
            })
            .collect()
    }

    fn notify(path: &str, notifications: Vec<(Arc<dyn LeaderLatchListener>, bool)>) {
        // Demotions first so two engines are never told to run at once.
        for (listener, _) in notifications.iter().filter(|(_, promoted)| !promoted) {
            tracing::debug!(path, "Notifying demotion");
            listener.on_demoted();
        }
        for (listener, _) in notifications.iter().filter(|(_, promoted)| *promoted) {
            tracing::debug!(path, "Notifying promotion");
            listener.on_promoted();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One node's view of a [`LocalElection`].
#[derive(Clone)]
pub struct LocalCoordination {
    node_id: u64,
    election: LocalElection,
}

impl LocalCoordination {
    pub fn node_id(&self) -> u64 {
        self.node_id
    }
}

#[async_trait]
impl CoordinationService for LocalCoordination {
    async fn register_leadership_component(&self, path: &str) -> Result<(), CoordinationError> {
        let mut groups = self.election.lock();
        let group = groups.entry(path.to_string()).or_default();
        if !group.candidates.contains(&self.node_id) {
            group.candidates.push(self.node_id);
        }
        if self.election.auto_elect && group.leader.is_none() {
            group.leader = Some(self.node_id);
            tracing::info!(path, node_id = self.node_id, "Elected leader");
        }
        Ok(())
    }

    async fn is_leader(&self, path: &str) -> Result<bool, CoordinationError> {
        let groups = self.election.lock();
        let group = groups
            .get(path)
            .ok_or_else(|| CoordinationError::UnknownPath(path.to_string()))?;
        Ok(group.leader == Some(self.node_id))
    }

    async fn add_listener(
        &self,
        listener: Arc<dyn LeaderLatchListener>,
        path: &str,
    ) -> Result<(), CoordinationError> {
        let mut groups = self.election.lock();
        let group = groups
            .get_mut(path)
            .ok_or_else(|| CoordinationError::UnknownPath(path.to_string()))?;
        group.listeners.push((self.node_id, listener));
        Ok(())
    }
}
