use crate::application::live_state::{
    listen, system_now, ListenerSet, LiveState, NowProvider, RefetchFuture,
};
use crate::domain::models::TimeRecord;
use crate::domain::reconciliation::{
    any_running, dedup_records, reconcile_records, sum_live_seconds, ViewerClock,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{
    fetch_clock_state, fetch_records_for_tasks, ChangeFilter, ChangeNotice, RemoteStore, Table,
    TASK_ID_COLUMN, USER_ID_COLUMN,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

pub type RecordsByTask = HashMap<String, Vec<TimeRecord>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BatchInputs {
    task_ids: BTreeSet<String>,
    user_id: Option<String>,
}

fn normalize_task_ids<I, T>(task_ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    task_ids
        .into_iter()
        .map(Into::into)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

fn normalize_user_id(user_id: Option<String>) -> Option<String> {
    user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

struct BatchTrackerCore<S: RemoteStore + ?Sized> {
    store: Arc<S>,
    viewer_id: String,
    inputs: Mutex<BatchInputs>,
    state: LiveState<RecordsByTask>,
}

impl<S: RemoteStore + ?Sized> BatchTrackerCore<S> {
    fn inputs(&self) -> BatchInputs {
        self.inputs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn tracks(&self, task_id: &str) -> bool {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task_ids
            .contains(task_id)
    }

    fn is_relevant(&self, notice: &ChangeNotice) -> bool {
        match notice {
            ChangeNotice::Changed(event) => event
                .column(TASK_ID_COLUMN)
                .map(|task_id| self.tracks(task_id))
                .unwrap_or(false),
            ChangeNotice::Lagged(_) => true,
        }
    }

    async fn refetch(&self) {
        let task_ids: Vec<String> = self.inputs().task_ids.into_iter().collect();
        if task_ids.is_empty() {
            self.state.clear();
            return;
        }
        let ticket = self.state.begin();
        let result = self.load(&task_ids).await;
        self.state.apply(ticket, result);
    }

    async fn load(&self, task_ids: &[String]) -> Result<RecordsByTask, InfraError> {
        let fetched = fetch_records_for_tasks(&*self.store, task_ids).await?;
        let clock = fetch_clock_state(&*self.store, &self.viewer_id).await?;

        let fetched_count = fetched.len();
        let records = dedup_records(fetched);
        if records.len() != fetched_count {
            warn!(
                dropped = fetched_count - records.len(),
                "duplicate time records for the same task and user"
            );
        }

        let viewer = ViewerClock::new(self.viewer_id.clone(), clock);
        let mut grouped: RecordsByTask = task_ids
            .iter()
            .map(|task_id| (task_id.clone(), Vec::new()))
            .collect();
        for record in reconcile_records(&records, &viewer) {
            grouped.entry(record.task_id.clone()).or_default().push(record);
        }
        debug!(tasks = task_ids.len(), records = records.len(), "reconciled batch time records");
        Ok(grouped)
    }
}

/// The record stream is subscribed unfiltered and narrowed to the task set
/// here. Fine for tens of tasks; it does not scale to thousands.
pub struct BatchTimeTracker<S: RemoteStore + ?Sized + 'static> {
    core: Arc<BatchTrackerCore<S>>,
    listeners: ListenerSet,
    mounted: bool,
    now_provider: NowProvider,
}

impl<S: RemoteStore + ?Sized + 'static> BatchTimeTracker<S> {
    pub fn new<I, T>(
        store: Arc<S>,
        viewer_id: impl Into<String>,
        task_ids: I,
        user_id: Option<String>,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let inputs = BatchInputs {
            task_ids: normalize_task_ids(task_ids),
            user_id: normalize_user_id(user_id),
        };
        let is_loading = !inputs.task_ids.is_empty();
        Self {
            core: Arc::new(BatchTrackerCore {
                store,
                viewer_id: viewer_id.into(),
                inputs: Mutex::new(inputs),
                state: LiveState::new("batch_time", is_loading),
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

    pub async fn set_task_ids<I, T>(&mut self, task_ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut inputs = self.core.inputs();
        inputs.task_ids = normalize_task_ids(task_ids);
        self.replace_inputs(inputs).await;
    }

    pub async fn set_user_id(&mut self, user_id: Option<String>) {
        let mut inputs = self.core.inputs();
        inputs.user_id = normalize_user_id(user_id);
        self.replace_inputs(inputs).await;
    }

    async fn replace_inputs(&mut self, inputs: BatchInputs) {
        if self.core.inputs() == inputs {
            return;
        }
        *self.core.inputs.lock().unwrap_or_else(PoisonError::into_inner) = inputs;
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
        let inputs = self.core.inputs();
        if inputs.task_ids.is_empty() {
            return;
        }

        let records = self.core.store.subscribe(Table::TimeRecords, None);
        let core = Arc::clone(&self.core);
        self.listeners.spawn(listen(
            records,
            move |notice| core.is_relevant(notice),
            refetch_handle(Arc::clone(&self.core)),
        ));

        if let Some(user_id) = inputs.user_id.as_deref() {
            let clock = self
                .core
                .store
                .subscribe(Table::GlobalClock, Some(ChangeFilter::eq(USER_ID_COLUMN, user_id)));
            self.listeners.spawn(listen(clock, |_| true, refetch_handle(Arc::clone(&self.core))));
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.core.inputs().task_ids.into_iter().collect()
    }

    pub fn records_by_task(&self) -> RecordsByTask {
        self.core.state.read(Clone::clone)
    }

    pub fn get_task_records(&self, task_id: &str) -> Vec<TimeRecord> {
        self.core
            .state
            .read(|grouped| grouped.get(task_id).cloned().unwrap_or_default())
    }

    pub fn get_task_total_time(&self, task_id: &str) -> u64 {
        let now = (self.now_provider)();
        self.core.state.read(|grouped| {
            grouped
                .get(task_id)
                .map(|records| sum_live_seconds(records, now))
                .unwrap_or(0)
        })
    }

    pub fn is_task_active(&self, task_id: &str) -> bool {
        self.core
            .state
            .read(|grouped| grouped.get(task_id).map(|records| any_running(records)).unwrap_or(false))
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
}

fn refetch_handle<S>(core: Arc<BatchTrackerCore<S>>) -> impl Fn() -> RefetchFuture + Send + 'static
where
    S: RemoteStore + ?Sized + 'static,
{
    move || {
        let core = Arc::clone(&core);
        Box::pin(async move { core.refetch().await })
    }
}
