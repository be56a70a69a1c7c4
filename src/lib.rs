pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::batch_time_tracker::{BatchTimeTracker, RecordsByTask};
pub use application::bootstrap::{bootstrap_service, BootstrapResult};
pub use application::live_state::NowProvider;
pub use application::service::TimeTrackingService;
pub use application::task_time_tracker::{TaskTimeQuery, TaskTimeTracker};
pub use domain::elapsed::{calculate_total_time, format_duration_verbose, format_time_tracking};
pub use domain::models::{ClockStatus, GlobalClockState, TimeRecord};
pub use domain::reconciliation::{
    effective_status, reconcile_record, reconcile_records, EffectiveStatus, ViewerClock,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::memory_store::InMemoryRemoteStore;
pub use infrastructure::remote_store::{
    ChangeEvent, ChangeFilter, ChangeKind, Filter, RemoteStore, Subscription, Table,
};
pub use infrastructure::rest_store::RestRemoteStore;
