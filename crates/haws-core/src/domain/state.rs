//! Session lifecycle states.
//!
//! A session instance walks a straight line from `Disconnected` to
//! `Authenticated`; `Closing` can be entered from anywhere and is terminal
//! for that instance.  Reconnecting means building a new instance, so no
//! transition ever leads out of `Closing`.
//!
//! ```text
//! Disconnected ─start()─▶ Connecting ─auth_required─▶ AwaitingAuth ─auth_ok─▶ Authenticated
//!       │                     │                            │                        │
//!       └─────────────────────┴──────────── close() ───────┴────────────────────────┴─▶ Closing
//! ```

use std::fmt;

/// The state of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Constructed, `start()` not yet called.
    #[default]
    Disconnected,
    /// Transport being opened; waiting for the hub's `auth_required`.
    Connecting,
    /// Auth frame sent; waiting for `auth_ok` or `auth_invalid`.
    AwaitingAuth,
    /// Handshake complete; message ids are being allocated.
    Authenticated,
    /// Torn down.  Terminal for this instance.
    Closing,
}

impl SessionState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Transitions are linear, except that `Closing` is reachable from every
    /// state (including itself, so a repeated `close()` is not a violation).
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, AwaitingAuth)
                | (AwaitingAuth, Authenticated)
                | (_, Closing)
        )
    }

    /// Returns `true` while the handshake has not completed.
    ///
    /// Protocol violations seen in these states are treated as transport
    /// faults rather than dropped frames.
    pub fn is_handshake(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::AwaitingAuth)
    }

    /// Returns `true` once the instance has been torn down.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closing
    }

    /// Short lowercase label used in log records.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingAuth => "awaiting-auth",
            SessionState::Authenticated => "authenticated",
            SessionState::Closing => "closing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 5] = [Disconnected, Connecting, AwaitingAuth, Authenticated, Closing];

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(SessionState::default(), Disconnected);
    }

    #[test]
    fn test_linear_handshake_path_is_legal() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(AwaitingAuth));
        assert!(AwaitingAuth.can_transition_to(Authenticated));
    }

    #[test]
    fn test_closing_is_reachable_from_every_state() {
        for state in ALL {
            assert!(state.can_transition_to(Closing), "{state} -> closing");
        }
    }

    #[test]
    fn test_closing_is_terminal() {
        for state in ALL.into_iter().filter(|s| *s != Closing) {
            assert!(!Closing.can_transition_to(state), "closing -> {state}");
        }
        assert!(Closing.is_terminal());
    }

    #[test]
    fn test_skipping_auth_is_illegal() {
        // Authentication can only complete after the auth frame was sent.
        assert!(!Connecting.can_transition_to(Authenticated));
        assert!(!Disconnected.can_transition_to(Authenticated));
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!Authenticated.can_transition_to(AwaitingAuth));
        assert!(!AwaitingAuth.can_transition_to(Connecting));
        assert!(!Connecting.can_transition_to(Disconnected));
    }

    #[test]
    fn test_handshake_states() {
        assert!(Connecting.is_handshake());
        assert!(AwaitingAuth.is_handshake());
        assert!(!Authenticated.is_handshake());
        assert!(!Disconnected.is_handshake());
        assert!(!Closing.is_handshake());
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(AwaitingAuth.to_string(), "awaiting-auth");
        assert_eq!(Authenticated.to_string(), "authenticated");
    }
}
