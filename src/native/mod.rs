//! Native build steps: CMake configure, project mutation, build driver
//!
//! Every external tool runs through [`CommandRunner`](crate::process::CommandRunner)
//! so the steps can be exercised with `mock::MockRunner`.

pub mod build;
pub mod configure;
pub mod mutate;

pub use build::{locate_msbuild, BuildDriver, BuildError, BuildOutcome, BuildRequest, Builder};
pub use configure::{
    is_multi_config, is_visual_studio, ConfigureError, ConfigureOutcome, ProjectConfigurer,
    FALLBACK_VS_GENERATOR, UNIX_GENERATOR, VS_GENERATORS,
};
pub use mutate::{rewrite_runtime_library, MutationError, ProjectMutator};

use std::path::{Path, PathBuf};

/// CMake target producing the C++ wrapper library
pub const WRAPPER_TARGET: &str = "libcef_dll_wrapper";

/// Solution CMake generates for a CEF binary distribution
pub fn solution_path(build_dir: &Path) -> PathBuf {
    build_dir.join("cef.sln")
}

/// Generated MSBuild project of the wrapper library
pub fn wrapper_project_path(build_dir: &Path) -> PathBuf {
    build_dir
        .join(WRAPPER_TARGET)
        .join(format!("{}.vcxproj", WRAPPER_TARGET))
}

/// Location of `vswhere.exe`
pub fn vswhere_path() -> PathBuf {
    let program_files = std::env::var_os("ProgramFiles(x86)")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("C:\\Program Files (x86)"));
    program_files
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe")
}
