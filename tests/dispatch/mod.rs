//! Dispatcher integration tests.
//!
//! Cover the full job lifecycle: target resolution, per-analyzer policy,
//! concurrent execution, remote polling, failure isolation and aggregation.

mod cancellation;
mod isolation;
mod policy;
mod remote;
mod storage;
