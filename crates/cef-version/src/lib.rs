//! CEF version descriptors and platform targets.
//!
//! A CEF binary distribution is identified by a composite version string
//! (`120.1.10+g3ce3184+chromium-120.0.6099.129`) plus the platform and CPU
//! architecture it was built for.

mod descriptor;
mod platform;

pub use descriptor::{VersionDescriptor, VersionError};
pub use platform::{Architecture, Platform, PlatformError, PlatformTarget};
