//! Debug transport implementations.
//!
//! Real probes live outside this crate and implement
//! [`CoreInterface`](crate::CoreInterface) themselves. The only transport
//! shipped here is the simulated core used for dry runs and tests.

pub mod fake_core;
