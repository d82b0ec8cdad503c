//! CEF Lane CLI
//!
//! Entry point for the `cef-lane` command-line tool.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use cef_lane::config::DEFAULT_CONFIG_FILE;
use cef_lane::http::{HttpConfig, Progress, ReqwestClient};
use cef_lane::process::ProcessRunner;
use cef_lane::state::PhaseName;
use cef_lane::telemetry::{init_tracing, level_for};
use cef_lane::{
    BuildConfiguration, EffectiveConfig, ExitCode, Orchestrator, PathOverrides, RunOptions,
    RunPaths,
};

#[derive(Parser)]
#[command(name = "cef-lane")]
#[command(about = "Acquire, verify and build the Chromium Embedded Framework", version)]
struct Cli {
    /// Configuration file (default: cef_config.json when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Report what would happen without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration and resolved paths, then exit
    #[arg(long)]
    show_config: bool,

    /// Skip detection, backup, download, install and verification
    #[arg(long)]
    skip_download: bool,

    /// Skip toolchain provisioning, configure, build and collection
    #[arg(long)]
    skip_build: bool,

    /// CEF version to acquire (overrides cef_version)
    #[arg(long)]
    target_version: Option<String>,

    /// Installation directory
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Application whose bundled framework should be upgraded
    #[arg(long)]
    app_path: Option<PathBuf>,

    /// Backup archive directory
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Run log root
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Existing framework tree to build from
    #[arg(long)]
    cef_source: Option<PathBuf>,

    /// Deployment directory (overrides output_directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// CMake executable to use instead of provisioning one
    #[arg(long)]
    cmake_path: Option<PathBuf>,

    /// Emit console logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Increase console verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> PathOverrides {
        PathOverrides {
            install_dir: self.install_dir.clone(),
            app_path: self.app_path.clone(),
            backup_dir: self.backup_dir.clone(),
            log_dir: self.log_dir.clone(),
            cef_source: self.cef_source.clone(),
            cmake_path: self.cmake_path.clone(),
        }
    }

    /// Flags that map onto configuration keys
    fn config_overrides(&self) -> Option<Value> {
        let mut map = Map::new();
        if let Some(version) = &self.target_version {
            map.insert("cef_version".to_string(), json!(version));
        }
        if let Some(output) = &self.output_dir {
            map.insert("output_directory".to_string(), json!(output.to_string_lossy()));
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    /// Explicit path, else the default file when it exists
    fn config_path(&self, root: &Path) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = root.join(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, level_for(cli.verbose));

    let root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error reading working directory: {}", e);
            process::exit(ExitCode::ConfigInvalid.as_i32());
        }
    };

    let config_path = cli.config_path(&root);
    let (config, effective) =
        match BuildConfiguration::load(config_path.as_deref(), cli.config_overrides(), &root) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(ExitCode::ConfigInvalid.as_i32());
            }
        };
    let paths = RunPaths::resolve(&config, &cli.overrides(), &root);

    if cli.show_config {
        show_config(&effective, &config, &paths);
        return;
    }

    let http = match ReqwestClient::new(HttpConfig::default()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            process::exit(ExitCode::DownloadFailed.as_i32());
        }
    };
    let options = RunOptions {
        dry_run: cli.dry_run,
        skip_download: cli.skip_download,
        skip_build: cli.skip_build,
    };
    let orchestrator = Orchestrator::new(
        config,
        paths,
        options,
        Arc::new(http),
        Arc::new(ProcessRunner),
    );

    // One bar per transferring phase
    let mut current: Option<(PhaseName, ProgressBar)> = None;
    let mut on_progress = |phase: PhaseName, progress: Progress| {
        if current.as_ref().map(|(p, _)| *p) != Some(phase) {
            if let Some((_, old)) = current.take() {
                old.finish_and_clear();
            }
            current = Some((phase, new_bar(phase, progress.total)));
        }
        if let Some((_, bar)) = &current {
            if let (Some(total), None) = (progress.total, bar.length()) {
                bar.set_length(total);
            }
            bar.set_position(progress.downloaded);
        }
    };

    let result = orchestrator.run(&mut on_progress);
    if let Some((_, bar)) = current.take() {
        bar.finish_and_clear();
    }
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Run error: {}", e);
            process::exit(1);
        }
    };

    println!("{}", outcome.report.to_text());
    println!("Run log: {}", outcome.log_dir.display());
    process::exit(outcome.report.exit_code);
}

fn new_bar(phase: PhaseName, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::with_template(
        "{msg:>12} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(phase.to_string());
    bar
}

fn show_config(effective: &EffectiveConfig, config: &BuildConfiguration, paths: &RunPaths) {
    let view = json!({
        "effective": effective,
        "target": config.target.to_string(),
        "unrecognized_keys": config.extra,
        "paths": paths,
    });
    match serde_json::to_string_pretty(&view) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
