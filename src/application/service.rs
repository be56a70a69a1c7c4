use crate::application::batch_time_tracker::BatchTimeTracker;
use crate::application::live_state::{system_now, NowProvider};
use crate::application::task_time_tracker::{TaskTimeQuery, TaskTimeTracker};
use crate::domain::models::GlobalClockState;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{fetch_clock_state, RemoteStore};
use std::sync::Arc;

pub struct TimeTrackingService<S: RemoteStore + ?Sized + 'static> {
    store: Arc<S>,
    viewer_id: String,
    now_provider: NowProvider,
}

impl<S: RemoteStore + ?Sized + 'static> TimeTrackingService<S> {
    pub fn new(store: Arc<S>, viewer_id: impl Into<String>) -> Self {
        Self {
            store,
            viewer_id: viewer_id.into(),
            now_provider: system_now(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub async fn track_task(&self, query: TaskTimeQuery) -> TaskTimeTracker<S> {
        let mut tracker = TaskTimeTracker::new(Arc::clone(&self.store), self.viewer_id.clone(), query)
            .with_now_provider(Arc::clone(&self.now_provider));
        tracker.mount().await;
        tracker
    }

    pub async fn track_tasks<I, T>(&self, task_ids: I, user_id: Option<String>) -> BatchTimeTracker<S>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tracker =
            BatchTimeTracker::new(Arc::clone(&self.store), self.viewer_id.clone(), task_ids, user_id)
                .with_now_provider(Arc::clone(&self.now_provider));
        tracker.mount().await;
        tracker
    }

    pub async fn viewer_clock(&self) -> Result<Option<GlobalClockState>, InfraError> {
        fetch_clock_state(&*self.store, &self.viewer_id).await
    }
}
