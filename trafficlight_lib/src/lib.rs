//! A single traffic light whose phase toggles on a randomized interval and
//! whose transitions are published to waiters through a blocking queue.

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod phase;
pub mod policy;
pub mod queue;

pub use crate::config::ControllerConfig;
pub use crate::controller::{PhaseController, PhaseSubscription};
pub use crate::error::Error;
pub use crate::phase::Phase;
pub use crate::policy::{CyclePolicy, FixedCycle, RandomCycle};
pub use crate::queue::{BlockingQueue, Discipline};
