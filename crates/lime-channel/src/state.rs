//! Session state machine.

use lime_core::SessionState;

/// Whether the session state machine allows moving from `from` to `to`.
///
/// `Failed` is reachable from every non-terminal state. `Negotiating` and
/// `Authenticating` allow self-transitions for multi-round exchanges.
/// `New` may jump straight to `Established` when a server skips both
/// negotiation and authentication.
pub fn validate_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    match from {
        New => matches!(to, Negotiating | Authenticating | Established | Failed),
        Negotiating => matches!(to, Negotiating | Authenticating | Failed),
        Authenticating => matches!(to, Authenticating | Established | Failed),
        Established => matches!(to, Finishing | Finished | Failed),
        Finishing => matches!(to, Finished | Failed),
        Finished | Failed => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 7] = [
        New,
        Negotiating,
        Authenticating,
        Established,
        Finishing,
        Finished,
        Failed,
    ];

    #[test]
    fn happy_path_is_allowed() {
        assert!(validate_transition(New, Negotiating));
        assert!(validate_transition(Negotiating, Authenticating));
        assert!(validate_transition(Authenticating, Established));
        assert!(validate_transition(Established, Finishing));
        assert!(validate_transition(Finishing, Finished));
    }

    #[test]
    fn negotiation_and_authentication_may_skip_or_repeat() {
        assert!(validate_transition(New, Authenticating));
        assert!(validate_transition(New, Established));
        assert!(validate_transition(Negotiating, Negotiating));
        assert!(validate_transition(Authenticating, Authenticating));
    }

    #[test]
    fn failure_reachable_from_every_non_terminal_state() {
        for from in ALL {
            assert_eq!(validate_transition(from, Failed), !from.is_terminal());
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!validate_transition(Finished, to));
            assert!(!validate_transition(Failed, to));
        }
    }

    #[test]
    fn no_transitions_backward() {
        assert!(!validate_transition(Negotiating, New));
        assert!(!validate_transition(Authenticating, Negotiating));
        assert!(!validate_transition(Established, Authenticating));
        assert!(!validate_transition(Established, Established));
        assert!(!validate_transition(Finishing, Established));
    }
}
