//! Background services

pub mod pool_maintenance;

pub use pool_maintenance::{PoolMaintenanceHandle, PoolMaintenanceService};
