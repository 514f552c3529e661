//! View state shared between the client and its background listeners.
//!
//! The lock is never held across an await; every change also goes out on the
//! event channel so a rendering layer can redraw without polling.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use wave_types::{Account, OperationState, SessionState, Submission, WaveView};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Session(SessionState),
    Account(Option<Account>),
    Operation(OperationState),
    SubmissionsReplaced { count: usize },
    SubmissionAppended(Submission),
    TotalCount(u64),
    /// A new error message, or `None` once it is cleared.
    Error(Option<String>),
}

pub(crate) struct SharedState {
    view: Mutex<WaveView>,
    events: broadcast::Sender<ClientEvent>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            view: Mutex::new(WaveView::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaveView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn snapshot(&self) -> WaveView {
        self.lock().clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut WaveView) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn account(&self) -> Option<Account> {
        self.lock().account.clone()
    }

    pub(crate) fn session(&self) -> SessionState {
        self.lock().session
    }

    pub(crate) fn set_session(&self, session: SessionState) {
        let changed = self.update(|view| {
            let changed = view.session != session;
            view.session = session;
            changed
        });
        if changed {
            self.emit(ClientEvent::Session(session));
        }
    }

    /// Marks a connect as started and returns the session to restore if it
    /// fails. `None` when a connect is already pending.
    pub(crate) fn begin_connect(&self) -> Option<SessionState> {
        let previous = self.update(|view| {
            if view.session == SessionState::ConnectPending {
                return None;
            }
            let previous = view.session;
            view.session = SessionState::ConnectPending;
            view.error = None;
            Some(previous)
        });
        if previous.is_some() {
            self.emit(ClientEvent::Session(SessionState::ConnectPending));
        }
        previous
    }

    pub(crate) fn set_operation(&self, operation: OperationState) {
        let changed = self.update(|view| {
            let changed = view.operation != operation;
            view.operation = operation;
            changed
        });
        if changed {
            self.emit(ClientEvent::Operation(operation));
        }
    }

    pub(crate) fn connected(&self, account: Account) {
        let account_changed = self.update(|view| {
            let changed = view.account.as_ref() != Some(&account);
            view.account = Some(account.clone());
            view.connect_prompt = false;
            changed
        });
        if account_changed {
            self.emit(ClientEvent::Account(Some(account)));
        }
        self.set_session(SessionState::Connected);
    }

    /// The wallet no longer exposes any account. A connect in progress keeps
    /// its pending state.
    pub(crate) fn disconnected(&self) {
        let (had_account, session_changed) = self.update(|view| {
            let had_account = view.account.take().is_some();
            let session_changed = view.session == SessionState::Connected;
            if session_changed {
                view.session = SessionState::Disconnected;
            }
            (had_account, session_changed)
        });
        if had_account {
            self.emit(ClientEvent::Account(None));
        }
        if session_changed {
            self.emit(ClientEvent::Session(SessionState::Disconnected));
        }
    }

    /// Ends a failed connect. Only a session still pending is rolled back;
    /// one that became connected meanwhile is kept.
    pub(crate) fn abandon_connect(&self, previous: SessionState) {
        let restored = self.update(|view| {
            if view.session != SessionState::ConnectPending {
                return None;
            }
            view.session = match (previous, &view.account) {
                (SessionState::Connected, Some(_)) => SessionState::Connected,
                _ => SessionState::Disconnected,
            };
            Some(view.session)
        });
        if let Some(session) = restored {
            self.emit(ClientEvent::Session(session));
        }
    }

    pub(crate) fn set_error(&self, message: String) {
        self.update(|view| view.error = Some(message.clone()));
        self.emit(ClientEvent::Error(Some(message)));
    }

    pub(crate) fn clear_error(&self) {
        let had_error = self.update(|view| view.error.take().is_some());
        if had_error {
            self.emit(ClientEvent::Error(None));
        }
    }

    pub(crate) fn set_total_count(&self, total: u64) {
        self.update(|view| view.total_count = total);
        self.emit(ClientEvent::TotalCount(total));
    }

    pub(crate) fn replace_submissions(&self, submissions: Vec<Submission>) -> usize {
        let count = submissions.len();
        self.update(|view| {
            view.submissions = submissions;
            view.total_count = count as u64;
        });
        self.emit(ClientEvent::SubmissionsReplaced { count });
        self.emit(ClientEvent::TotalCount(count as u64));
        count
    }

    pub(crate) fn append_submission(&self, submission: Submission) {
        let total = self.update(|view| {
            view.submissions.push(submission.clone());
            view.total_count = view.submissions.len() as u64;
            view.total_count
        });
        self.emit(ClientEvent::SubmissionAppended(submission));
        self.emit(ClientEvent::TotalCount(total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    #[test]
    fn error_events_follow_real_changes() {
        let state = SharedState::new();
        let mut events = state.subscribe();

        state.clear_error();
        state.set_error("boom".to_owned());
        state.clear_error();
        state.clear_error();

        assert_eq!(
            drain(&mut events),
            vec![
                ClientEvent::Error(Some("boom".to_owned())),
                ClientEvent::Error(None),
            ]
        );
        assert_eq!(state.snapshot().error, None);
    }

    #[test]
    fn disconnect_is_silent_when_nothing_changes() {
        let state = SharedState::new();
        let mut events = state.subscribe();

        state.disconnected();
        assert!(drain(&mut events).is_empty());

        state.connected(Account("0xA11CE".to_owned()));
        drain(&mut events);
        state.disconnected();
        assert_eq!(
            drain(&mut events),
            vec![
                ClientEvent::Account(None),
                ClientEvent::Session(SessionState::Disconnected),
            ]
        );
    }

    #[test]
    fn failed_connect_keeps_a_session_connected_meanwhile() {
        let state = SharedState::new();
        let previous = state.begin_connect().expect("not pending");
        state.connected(Account("0xA11CE".to_owned()));

        state.abandon_connect(previous);
        let view = state.snapshot();
        assert_eq!(view.session, SessionState::Connected);
        assert!(view.account.is_some());

        let previous = state.begin_connect().expect("not pending");
        assert_eq!(previous, SessionState::Connected);
        state.abandon_connect(previous);
        assert_eq!(state.session(), SessionState::Connected);
    }

    #[test]
    fn failed_connect_without_an_account_disconnects() {
        let state = SharedState::new();
        let previous = state.begin_connect().expect("not pending");
        assert!(state.begin_connect().is_none());

        state.abandon_connect(previous);
        assert_eq!(state.session(), SessionState::Disconnected);
    }
}
