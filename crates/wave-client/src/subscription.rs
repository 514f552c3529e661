use tokio::task::AbortHandle;
use uuid::Uuid;

/// Keeps a background listener alive. Dropping the handle, or calling
/// `unsubscribe`, stops it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    task: AbortHandle,
}

impl SubscriptionHandle {
    pub(crate) fn new(task: AbortHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The listeners a client currently runs; a new subscription of the same
/// kind replaces the old one.
#[derive(Default)]
pub(crate) struct Listeners {
    submissions: Option<AbortHandle>,
    accounts: Option<AbortHandle>,
}

impl Listeners {
    pub(crate) fn replace_submissions(&mut self, task: AbortHandle) {
        if let Some(previous) = self.submissions.replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn replace_accounts(&mut self, task: AbortHandle) {
        if let Some(previous) = self.accounts.replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn abort_submissions(&mut self) {
        if let Some(task) = self.submissions.take() {
            task.abort();
        }
    }

    pub(crate) fn abort_all(&mut self) {
        for task in [self.submissions.take(), self.accounts.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
