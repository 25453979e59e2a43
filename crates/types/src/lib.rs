#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the pkgd transaction service
//!
//! This crate provides the data model shared by every other crate:
//! package identities, resolved package metadata, task state and
//! interaction records.

pub mod ids;
pub mod interaction;
pub mod package;
pub mod task;

// Re-export commonly used types
pub use ids::{InteractionId, JobId, TaskId};
pub use interaction::{InteractionReply, InteractionRequest};
pub use package::{Arch, ModuleRef, Module, PackageInfo, PackageKind, PackageReference};
pub use semver::Version;
pub use task::{
    ProgressMessage, TaskFailure, TaskKind, TaskOutcome, TaskOutput, TaskState, TaskStatus,
    TaskTarget,
};
pub use uuid::Uuid;
