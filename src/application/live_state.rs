use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{ChangeNotice, Subscription};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
pub type RefetchFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub fn system_now() -> NowProvider {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug)]
struct LiveInner<T> {
    value: T,
    is_loading: bool,
    error: Option<String>,
    applied: FetchTicket,
    revision: u64,
}

/// A response whose ticket is not newer than the last applied one is dropped.
#[derive(Debug)]
pub struct LiveState<T> {
    label: &'static str,
    inner: Mutex<LiveInner<T>>,
    next_ticket: AtomicU64,
    revisions: watch::Sender<u64>,
}

impl<T: Default> LiveState<T> {
    pub fn new(label: &'static str, is_loading: bool) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            label,
            inner: Mutex::new(LiveInner {
                value: T::default(),
                is_loading,
                error: None,
                applied: FetchTicket(0),
                revision: 0,
            }),
            next_ticket: AtomicU64::new(1),
            revisions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self) -> FetchTicket {
        FetchTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    /// Failures reset the value and keep the message. Returns `false` when stale.
    pub fn apply(&self, ticket: FetchTicket, result: Result<T, InfraError>) -> bool {
        let revision = {
            let mut inner = self.lock();
            if ticket <= inner.applied {
                debug!(
                    state = self.label,
                    ticket = ticket.0,
                    applied = inner.applied.0,
                    "discarding out-of-order fetch result"
                );
                return false;
            }
            match result {
                Ok(value) => {
                    inner.value = value;
                    inner.error = None;
                }
                Err(error) => {
                    warn!(state = self.label, %error, "time tracking fetch failed");
                    inner.value = T::default();
                    inner.error = Some(error.to_string());
                }
            }
            inner.is_loading = false;
            inner.applied = ticket;
            inner.revision += 1;
            inner.revision
        };
        self.revisions.send_replace(revision);
        true
    }

    pub fn clear(&self) {
        let ticket = self.begin();
        self.apply(ticket, Ok(T::default()));
    }

    pub fn read<R>(&self, reader: impl FnOnce(&T) -> R) -> R {
        reader(&self.lock().value)
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}

#[derive(Debug, Default)]
pub struct ListenerSet {
    handles: Vec<JoinHandle<()>>,
}

impl ListenerSet {
    pub fn spawn<Fut>(&mut self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
    }

    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        self.clear();
    }
}

pub async fn listen<A, F, Fut>(mut subscription: Subscription, accept: A, on_change: F)
where
    A: Fn(&ChangeNotice) -> bool,
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let table = subscription.table();
    while let Some(notice) = subscription.next().await {
        if !accept(&notice) {
            continue;
        }
        debug!(table = table.as_str(), "change notification, refetching");
        on_change().await;
    }
    debug!(table = table.as_str(), "change stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_wins_regardless_of_arrival_order() {
        let state: LiveState<Vec<u32>> = LiveState::new("test", true);
        let first = state.begin();
        let second = state.begin();

        assert!(state.apply(second, Ok(vec![2])));
        assert!(!state.apply(first, Ok(vec![1])));

        assert_eq!(state.read(Clone::clone), vec![2]);
        assert!(!state.is_loading());
    }

    #[test]
    fn failure_clears_value_and_keeps_message() {
        let state: LiveState<Vec<u32>> = LiveState::new("test", true);
        let ticket = state.begin();
        state.apply(ticket, Ok(vec![7]));

        let ticket = state.begin();
        state.apply(ticket, Err(InfraError::Remote("permission denied".to_string())));

        assert!(state.read(Vec::is_empty));
        assert_eq!(
            state.error().as_deref(),
            Some("Remote store error: permission denied")
        );
        assert!(!state.is_loading());

        let ticket = state.begin();
        state.apply(ticket, Ok(vec![8]));
        assert_eq!(state.error(), None);
    }

    #[test]
    fn clear_supersedes_in_flight_fetches() {
        let state: LiveState<Vec<u32>> = LiveState::new("test", true);
        let in_flight = state.begin();
        state.clear();

        assert!(!state.apply(in_flight, Ok(vec![1])));
        assert!(state.read(Vec::is_empty));
        assert!(!state.is_loading());
    }

    #[test]
    fn revisions_advance_only_on_applied_results() {
        let state: LiveState<Vec<u32>> = LiveState::new("test", false);
        let receiver = state.revisions();
        let stale = state.begin();
        let fresh = state.begin();

        state.apply(fresh, Ok(vec![1]));
        state.apply(stale, Ok(vec![0]));

        assert_eq!(*receiver.borrow(), 1);
    }

    #[tokio::test]
    async fn listener_set_aborts_tasks_on_clear() {
        let mut listeners = ListenerSet::default();
        listeners.spawn(std::future::pending::<()>());
        assert_eq!(listeners.len(), 1);
        listeners.clear();
        assert!(listeners.is_empty());
    }
}
