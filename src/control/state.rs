//! Control connection lifecycle state

use std::fmt;

/// Lifecycle of a control connection.
///
/// Moves forward only: `Disconnected -> Connected -> Authenticated -> Closed`
/// (`Closed` is reachable from any state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Authenticated,
    Closed,
}

impl ConnectionState {
    /// Whether moving to `next` keeps the lifecycle monotonic
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        next == ConnectionState::Closed || next > self
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_advance_to(Connected));
        assert!(Connected.can_advance_to(Authenticated));
        assert!(Authenticated.can_advance_to(Closed));
        assert!(Connected.can_advance_to(Closed));
        assert!(!Authenticated.can_advance_to(Connected));
        assert!(!Closed.can_advance_to(Connected));
        assert!(!Connected.can_advance_to(Connected));
    }
}
