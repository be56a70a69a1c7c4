pub mod elapsed;
pub mod models;
pub mod reconciliation;
