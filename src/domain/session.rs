use crate::domain::models::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Loading,
    Authenticated(Identity),
    Anonymous,
}

/// What the controller has to do after a provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    SignedIn(Identity),
    SwitchedUser { previous: Identity, current: Identity },
    SignedOut,
    Unchanged,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Applies one provider notification. `Loading` is never re-entered.
    pub fn apply(&mut self, notification: Option<Identity>) -> SessionTransition {
        let previous = std::mem::replace(self, Self::Anonymous);
        match (previous, notification) {
            (Self::Authenticated(current), Some(next)) if current.uid == next.uid => {
                *self = Self::Authenticated(next);
                SessionTransition::Unchanged
            }
            (Self::Authenticated(previous), Some(current)) => {
                *self = Self::Authenticated(current.clone());
                SessionTransition::SwitchedUser { previous, current }
            }
            (Self::Loading | Self::Anonymous, Some(identity)) => {
                *self = Self::Authenticated(identity.clone());
                SessionTransition::SignedIn(identity)
            }
            (Self::Authenticated(_), None) => SessionTransition::SignedOut,
            (Self::Loading, None) => SessionTransition::SignedOut,
            (Self::Anonymous, None) => SessionTransition::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
        }
    }

    #[test]
    fn starts_in_loading() {
        let state = SessionState::default();
        assert!(state.is_loading());
        assert!(state.identity().is_none());
    }

    #[test]
    fn loading_to_anonymous_then_sign_in() {
        let mut state = SessionState::default();
        assert_eq!(state.apply(None), SessionTransition::SignedOut);
        assert_eq!(state, SessionState::Anonymous);

        assert_eq!(
            state.apply(Some(identity("u1"))),
            SessionTransition::SignedIn(identity("u1"))
        );
        assert_eq!(state.identity(), Some(&identity("u1")));
    }

    #[test]
    fn repeated_notification_for_same_user_is_unchanged() {
        let mut state = SessionState::default();
        let _ = state.apply(Some(identity("u1")));
        assert_eq!(state.apply(Some(identity("u1"))), SessionTransition::Unchanged);
        assert_eq!(state.apply(Some(identity("u1"))), SessionTransition::Unchanged);
    }

    #[test]
    fn different_user_is_a_switch() {
        let mut state = SessionState::default();
        let _ = state.apply(Some(identity("u1")));
        assert_eq!(
            state.apply(Some(identity("u2"))),
            SessionTransition::SwitchedUser {
                previous: identity("u1"),
                current: identity("u2"),
            }
        );
    }

    #[test]
    fn never_returns_to_loading() {
        let mut state = SessionState::default();
        let _ = state.apply(Some(identity("u1")));
        assert_eq!(state.apply(None), SessionTransition::SignedOut);
        assert_eq!(state, SessionState::Anonymous);
        assert_eq!(state.apply(None), SessionTransition::Unchanged);
        assert!(!state.is_loading());
    }
}
