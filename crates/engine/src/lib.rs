//! Delivery engine: storage, retry policy, processing cycles and the worker
//! pool that drives them, plus the service facade the API calls into.

pub mod backoff;
pub mod clock;
pub mod error;
pub mod pool;
pub mod processor;
pub mod service;
pub mod store;

pub use error::EngineError;
pub use pool::{PoolConfig, PoolReport, WorkerPool};
pub use processor::{CycleContext, CycleFailure, CycleReport, Processor};
pub use service::{NotificationService, SendReceipt};
