//! Vigil: autonomous tick scheduling and worker-process supervision for a
//! long-running conversational agent.
//!
//! # Architecture
//!
//! Each invocation is short-lived and started by an external timer:
//! - **Decision engine**: turns time, interaction history and per-user
//!   silence into one next [`decision::Action`]
//! - **Command builder**: renders the action as a worker instruction
//! - **Command runner**: executes it with timeout, one restart and retry,
//!   then a direct fallback through the messaging collaborator
//! - **Supervisor**: health probe, crash budget and graduated recovery
//!   ([`health`], [`watchdog`])
//!
//! All history lives in JSON documents under one state directory
//! ([`state`]); overlapping invocations are excluded by lock files.

pub mod audit;
pub mod clock;
pub mod command;
pub mod config;
pub mod decision;
pub mod error;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod orchestrator;
pub mod paths;
pub mod runner;
pub mod state;
pub mod status;
pub mod watchdog;
pub mod worker;

pub use config::VigilConfig;
pub use error::{Result, VigilError};
pub use orchestrator::{Orchestrator, TickReport};
pub use watchdog::{Watchdog, WatchdogReport};
