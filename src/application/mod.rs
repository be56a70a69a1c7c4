pub mod batch_time_tracker;
pub mod bootstrap;
pub mod live_state;
pub mod service;
pub mod task_time_tracker;
