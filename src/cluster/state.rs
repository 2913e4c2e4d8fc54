use std::fmt;

/// Lifecycle of the cluster under test.
///
/// Only [`ClusterController`](crate::ClusterController) operations move a
/// cluster between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterState {
    /// Nothing laid out yet
    Unprovisioned,
    /// Node config files written
    Configured,
    /// Data directories bootstrapped
    Initialized,
    /// Every node passed its readiness poll since its last (re)start
    Running,
    /// At least one node is stopped or failed to come up
    PartiallyDown,
    /// Torn down
    Stopped,
}

impl ClusterState {
    /// Whether any node process may be alive in this state
    pub fn may_have_processes(&self) -> bool {
        matches!(self, ClusterState::Running | ClusterState::PartiallyDown)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ClusterState::Unprovisioned => "UNPROVISIONED",
            ClusterState::Configured => "CONFIGURED",
            ClusterState::Initialized => "INITIALIZED",
            ClusterState::Running => "RUNNING",
            ClusterState::PartiallyDown => "PARTIALLY_DOWN",
            ClusterState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}
