//! CEF Lane - acquire, verify and build the Chromium Embedded Framework
//!
//! This crate drives a CEF binary distribution through a vulnerability
//! preflight, acquisition (detect, back up, download, install, verify), a
//! native build of the C++ wrapper library and, optionally, integration
//! into a consuming application's solution.

pub mod backup;
pub mod config;
pub mod deploy;
pub mod detect;
pub mod download;
pub mod http;
pub mod install;
pub mod integration;
pub mod mock;
pub mod native;
pub mod pipeline;
pub mod process;
pub mod runlog;
pub mod security;
pub mod state;
pub mod summary;
pub mod telemetry;
pub mod toolchain;
pub mod verify;

pub use config::{BuildConfiguration, ConfigError, EffectiveConfig, PathOverrides, RunPaths};
pub use pipeline::{Endpoints, Orchestrator, PipelineError, RunOptions, RunOutcome};
pub use summary::{ExitCode, FailureKind, RunReport, RunStatus};
