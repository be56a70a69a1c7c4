use crate::application::live_state::{
    listen, system_now, ListenerSet, LiveState, NowProvider, RefetchFuture,
};
use crate::domain::models::TimeRecord;
use crate::domain::reconciliation::{
    any_running, dedup_records, live_seconds, reconcile_records, sum_live_seconds, ViewerClock,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{
    fetch_clock_state, fetch_task_records, ChangeFilter, RemoteStore, Table, TASK_ID_COLUMN,
    USER_ID_COLUMN,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// The clock subscription follows `user_id`; team views that leave it unset
/// only see the viewer's break or clock-out on the next record change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTimeQuery {
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub fetch_all_users: bool,
}

impl TaskTimeQuery {
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn all_users(mut self) -> Self {
        self.fetch_all_users = true;
        self
    }

    pub fn task_id(&self) -> Option<&str> {
        non_blank(self.task_id.as_deref())
    }

    pub fn user_id(&self) -> Option<&str> {
        non_blank(self.user_id.as_deref())
    }

    pub fn record_user_filter(&self) -> Option<&str> {
        if self.fetch_all_users {
            None
        } else {
            self.user_id()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

struct TaskTrackerCore<S: RemoteStore + ?Sized> {
    store: Arc<S>,
    viewer_id: String,
    query: Mutex<TaskTimeQuery>,
    state: LiveState<Vec<TimeRecord>>,
}

impl<S: RemoteStore + ?Sized> TaskTrackerCore<S> {
    fn query(&self) -> TaskTimeQuery {
        self.query.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn refetch(&self) {
        let query = self.query();
        let Some(task_id) = query.task_id() else {
            self.state.clear();
            return;
        };
        let ticket = self.state.begin();
        let result = self.load(task_id, query.record_user_filter()).await;
        self.state.apply(ticket, result);
    }

    async fn load(
        &self,
        task_id: &str,
        user_filter: Option<&str>,
    ) -> Result<Vec<TimeRecord>, InfraError> {
        let fetched = fetch_task_records(&*self.store, task_id, user_filter).await?;
        let clock = fetch_clock_state(&*self.store, &self.viewer_id).await?;

        let fetched_count = fetched.len();
        let records = dedup_records(fetched);
        if records.len() != fetched_count {
            warn!(
                task_id,
                dropped = fetched_count - records.len(),
                "duplicate time records for the same task and user"
            );
        }

        let viewer = ViewerClock::new(self.viewer_id.clone(), clock);
        debug!(task_id, records = records.len(), "reconciled task time records");
        Ok(reconcile_records(&records, &viewer))
    }
}

pub struct TaskTimeTracker<S: RemoteStore + ?Sized + 'static> {
    core: Arc<TaskTrackerCore<S>>,
    listeners: ListenerSet,
    mounted: bool,
    now_provider: NowProvider,
}

impl<S: RemoteStore + ?Sized + 'static> TaskTimeTracker<S> {
    pub fn new(store: Arc<S>, viewer_id: impl Into<String>, query: TaskTimeQuery) -> Self {
        let is_loading = query.task_id().is_some();
        Self {
            core: Arc::new(TaskTrackerCore {
                store,
                viewer_id: viewer_id.into(),
                query: Mutex::new(query),
                state: LiveState::new("task_time", is_loading),
            }),
            listeners: ListenerSet::default(),
            mounted: false,
            now_provider: system_now(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn mount(&mut self) {
        self.mounted = true;
        self.subscribe();
        self.core.refetch().await;
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.listeners.clear();
    }

    /// An unmounted tracker only records the query; the next `mount` uses it.
    pub async fn set_query(&mut self, query: TaskTimeQuery) {
        if self.core.query() == query {
            return;
        }
        *self.core.query.lock().unwrap_or_else(PoisonError::into_inner) = query;
        if self.mounted {
            self.subscribe();
            self.core.refetch().await;
        }
    }

    pub async fn refetch(&self) {
        self.core.refetch().await;
    }

    fn subscribe(&mut self) {
        self.listeners.clear();
        let query = self.core.query();
        let Some(task_id) = query.task_id() else {
            return;
        };

        let records = self.core.store.subscribe(
            Table::TimeRecords,
            Some(ChangeFilter::eq(TASK_ID_COLUMN, task_id)),
        );
        self.listeners.spawn(listen(records, |_| true, refetch_handle(Arc::clone(&self.core))));

        if let Some(user_id) = query.user_id() {
            let clock = self
                .core
                .store
                .subscribe(Table::GlobalClock, Some(ChangeFilter::eq(USER_ID_COLUMN, user_id)));
            self.listeners.spawn(listen(clock, |_| true, refetch_handle(Arc::clone(&self.core))));
        }
    }

    pub fn query(&self) -> TaskTimeQuery {
        self.core.query()
    }

    pub fn records(&self) -> Vec<TimeRecord> {
        self.core.state.read(Clone::clone)
    }

    pub fn is_loading(&self) -> bool {
        self.core.state.is_loading()
    }

    pub fn error(&self) -> Option<String> {
        self.core.state.error()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.core.state.revisions()
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub fn get_user_total_time(&self, user_id: &str) -> u64 {
        let now = (self.now_provider)();
        self.core.state.read(|records| {
            records
                .iter()
                .find(|record| record.belongs_to(user_id))
                .map(|record| live_seconds(record, now))
                .unwrap_or(0)
        })
    }

    pub fn get_total_time(&self) -> u64 {
        let now = (self.now_provider)();
        self.core.state.read(|records| sum_live_seconds(records, now))
    }

    pub fn get_primary_record(&self) -> Option<TimeRecord> {
        self.core.state.read(|records| records.first().cloned())
    }

    pub fn is_anyone_tracking(&self) -> bool {
        self.core.state.read(|records| any_running(records))
    }
}

fn refetch_handle<S>(core: Arc<TaskTrackerCore<S>>) -> impl Fn() -> RefetchFuture + Send + 'static
where
    S: RemoteStore + ?Sized + 'static,
{
    move || {
        let core = Arc::clone(&core);
        Box::pin(async move { core.refetch().await })
    }
}
