//! In-process test doubles
//!
//! - `MockHttp`: scripted JSON responses and downloads, per-method call counters
//! - `MockRunner`: scripted exit codes, recorded invocations, optional
//!   filesystem side effects standing in for what the real tool would write
//!
//! Both record everything they are asked to do so tests can assert that a
//! phase made zero network calls or never launched a build.

mod http;
mod runner;

pub use http::MockHttp;
pub use runner::{MockRunner, SideEffect};
