use std::fmt;

/// Lifecycle of a [`Store`](crate::Store).
///
/// ```text
/// Uninitialized ──> Recovering ──> Ready ──> Closing ──> Closed
///                                    ▲          │
///                                    └──────────┘  final flush failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The log file has not been opened yet
    Uninitialized,
    /// Replaying the log into memory
    Recovering,
    /// Accepting reads and writes
    Ready,
    /// Draining in-flight operations before the final flush
    Closing,
    /// Terminal; every operation is rejected
    Closed,
}

impl Lifecycle {
    /// Returns true if the transition `self -> next` is allowed.
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Uninitialized, Recovering)
                | (Recovering, Ready)
                | (Ready, Closing)
                | (Closing, Closed)
                | (Closing, Ready)
        )
    }

    pub fn is_ready(self) -> bool {
        self == Lifecycle::Ready
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Recovering => "recovering",
            Lifecycle::Ready => "ready",
            Lifecycle::Closing => "closing",
            Lifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}
