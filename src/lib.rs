pub mod config;
pub mod data;
pub mod error;
pub mod hexbin;
pub mod keys;
pub mod reconcile;
pub mod render;
pub mod table;
pub mod types;

pub use config::AppConfig;
pub use error::ReconcileError;
pub use reconcile::{Reconciler, Reconciliation};
