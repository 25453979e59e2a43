#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transaction orchestration for pkgd
//!
//! This crate turns install, update, uninstall, prune, migrate and search
//! requests into tracked tasks. Work runs on bounded-concurrency job
//! queues; tasks move through an explicit state machine, may pause for
//! caller confirmation through the interaction broker, and publish every
//! transition on the event channel. Storage is delegated to a
//! [`pkgd_repository::Repository`] collaborator.

mod context;
mod coordinator;
mod gate;
mod install;
mod interaction;
mod maintenance;
mod queue;
mod search;
mod task;
mod uninstall;
mod update;

pub use context::CoordinatorBuilder;
pub use coordinator::TransactionCoordinator;
pub use queue::JobQueue;
