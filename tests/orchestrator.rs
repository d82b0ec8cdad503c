//! End-to-end runs of the orchestrator against scripted HTTP and commands

mod fixtures;

use serde_json::json;
use std::fs;
use std::path::PathBuf;

use cef_lane::download::{archive_kind, cdn_url, CDN_BASE_URL};
use cef_lane::http::HttpError;
use cef_lane::process::CommandOutput;
use cef_lane::runlog::{COMMANDS_FILE, EVENTS_FILE, SUMMARY_JSON_FILE, SUMMARY_TEXT_FILE};
use cef_lane::security::Severity;
use cef_lane::state::{PhaseName, PhaseState, WorkflowName};
use cef_lane::toolchain::{release_dir_name, release_url, RELEASE_BASE_URL};
use cef_lane::{FailureKind, RunOptions, RunStatus};
use cef_version::Platform;
use fixtures::*;

fn acquire_only() -> RunOptions {
    RunOptions {
        skip_build: true,
        ..Default::default()
    }
}

#[test]
fn test_fresh_acquire_completes_and_verifies() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.exit_code, 0);
    for phase in [PhaseName::Detect, PhaseName::Backup, PhaseName::Download, PhaseName::Install, PhaseName::Verify] {
        assert_eq!(phase_state(report, WorkflowName::Acquire, phase), PhaseState::Completed, "{}", phase);
    }
    assert!(all_skipped(report, WorkflowName::Build));
    assert!(all_skipped(report, WorkflowName::Integrate));

    let installed = report.installed.as_ref().unwrap();
    assert!(installed.found);
    assert_eq!(installed.root_path, ws.install_dir());
    assert_eq!(installed.version.as_ref().unwrap().to_string(), VERSION);

    let verification = report.verification.as_ref().unwrap();
    assert!(verification.passed);
    assert!(verification.checklist.iter().all(|c| c.ok));

    // Nothing existed, so nothing was archived
    assert!(report.backups.is_empty());
    assert!(report.restore.is_empty());

    for file in [SUMMARY_TEXT_FILE, SUMMARY_JSON_FILE, EVENTS_FILE] {
        assert!(outcome.log_dir.join(file).is_file(), "{}", file);
    }
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(outcome.log_dir.join(SUMMARY_JSON_FILE)).unwrap()).unwrap();
    assert_eq!(summary["status"], "succeeded");
    assert_eq!(summary["version"], VERSION);
}

#[test]
fn test_critical_vulnerability_aborts_before_any_write() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    ws.http.push_json(Ok(json!({"vulns": [
        {"id": "OSV-2024-CRIT", "summary": "sandbox escape", "database_specific": {"severity": "CRITICAL"}}
    ]})));
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, Some(ws.fake_cmake()));

    let outcome = run(&ws.orchestrator(config, paths, RunOptions::default()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.exit_code, 10);
    assert_eq!(
        phase_state(report, WorkflowName::Preflight, PhaseName::SecurityGate),
        PhaseState::Failed
    );
    for workflow in [WorkflowName::Acquire, WorkflowName::Build, WorkflowName::Integrate] {
        assert!(all_skipped(report, workflow), "{}", workflow);
    }
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::SecurityAbort);
    assert!(failure.error.contains("OSV-2024-CRIT"));
    assert!(report.to_text().contains("OSV-2024-CRIT"));

    assert_eq!(ws.http.download_calls(), 0);
    assert_eq!(ws.http.head_calls(), 0);
    assert!(!ws.install_dir().exists());
    assert!(!ws.output_dir().exists());
    assert!(ws.runner.invocations().is_empty());
}

#[test]
fn test_existing_install_is_backed_up_and_upgraded() {
    let ws = Workspace::new();
    ws.seed_install(OLD_VERSION, Platform::Linux);
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.exit_code, 0);
    let detected = report.detected.as_ref().unwrap();
    assert!(detected.found);
    assert_eq!(detected.version.as_ref().unwrap().to_string(), OLD_VERSION);

    assert_eq!(report.backups.len(), 1);
    let backup = &report.backups[0];
    assert!(!backup.simulated);
    assert_eq!(backup.source_path, ws.install_dir());
    assert!(backup.archive_path.is_file());
    assert!(backup.size_bytes > 0);
    assert_eq!(report.restore.len(), 1);
    assert_eq!(report.restore[0].archive_path, backup.archive_path);
    assert!(report.to_text().contains("To restore"));

    let installed = report.installed.as_ref().unwrap();
    assert_ne!(installed.version, detected.version);
    assert_eq!(installed.version.as_ref().unwrap().to_string(), VERSION);
    let readme = fs::read_to_string(ws.install_dir().join("README.txt")).unwrap();
    assert!(readme.contains(VERSION));
}

#[test]
fn test_unavailable_gate_is_a_warning() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    ws.http.push_json(Err(HttpError::Connect("dns failure".into())));
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    assert_eq!(outcome.report.status, RunStatus::SucceededWithWarnings);
    assert_eq!(outcome.report.exit_code, 0);
    assert!(outcome.report.warnings.iter().any(|w| w.contains("operator review")));
    assert!(outcome.report.installed.is_some());
}

#[test]
fn test_medium_findings_are_reported_and_the_run_proceeds() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    ws.http.push_json(Ok(json!({"vulns": [
        {"id": "OSV-2024-MED", "summary": "information leak", "database_specific": {"severity": "MODERATE"}}
    ]})));
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::SucceededWithWarnings);
    assert_eq!(report.exit_code, 0);
    assert_eq!(
        phase_state(report, WorkflowName::Preflight, PhaseName::SecurityGate),
        PhaseState::Completed
    );
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Install), PhaseState::Completed);
    assert!(report.failure.is_none());

    let findings = &report.vulnerabilities.as_ref().unwrap().findings;
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Medium);
    assert!(report.warnings.iter().any(|w| w.contains("OSV-2024-MED")));

    let text = report.to_text();
    assert!(text.contains("MEDIUM"));
    assert!(text.contains("information leak"));
    let summary = fs::read_to_string(outcome.log_dir.join(SUMMARY_TEXT_FILE)).unwrap();
    assert!(summary.contains("OSV-2024-MED"));
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(outcome.log_dir.join(SUMMARY_JSON_FILE)).unwrap()).unwrap();
    assert_eq!(json["status"], "succeeded_with_warnings");
}

/// An application with a bundled framework and files of its own
fn app_with_bundled_framework(ws: &Workspace) -> PathBuf {
    let app = ws.root().join("myapp");
    distribution_tree(&app.join("third_party/cef"), OLD_VERSION, Platform::Linux);
    fs::write(app.join("user_settings.ini"), "[ui]\nzoom=1\n").unwrap();
    fs::create_dir_all(app.join("src")).unwrap();
    fs::write(app.join("src/main.cpp"), "int main() { return 0; }\n").unwrap();
    app
}

#[test]
fn test_app_framework_is_backed_up_and_app_left_intact() {
    let ws = Workspace::new();
    let app = app_with_bundled_framework(&ws);
    let before = snapshot(&app, &ws.root().join("work"));
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.app_paths(&config, &app);
    assert_eq!(paths.install_dir, ws.install_dir());

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.exit_code, 0, "{}", report.to_text());
    let detected = report.detected.as_ref().unwrap();
    assert!(detected.found);
    assert_eq!(detected.root_path, app.join("third_party/cef"));
    assert_eq!(detected.version.as_ref().unwrap().to_string(), OLD_VERSION);

    assert_eq!(report.backups.len(), 1);
    assert_eq!(report.backups[0].source_path, app.join("third_party/cef"));
    assert!(report.backups[0].archive_path.is_file());

    // The application is only read
    assert_eq!(snapshot(&app, &ws.root().join("work")), before);
    assert!(app.join("user_settings.ini").is_file());
    assert!(app.join("src/main.cpp").is_file());

    let installed = report.installed.as_ref().unwrap();
    assert_eq!(installed.root_path, ws.install_dir());
    assert_eq!(installed.version.as_ref().unwrap().to_string(), VERSION);
}

#[test]
fn test_previous_install_target_is_archived_with_app() {
    let ws = Workspace::new();
    let app = app_with_bundled_framework(&ws);
    ws.seed_install(OLD_VERSION, Platform::Linux);
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.app_paths(&config, &app);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.exit_code, 0, "{}", report.to_text());
    let sources: Vec<PathBuf> = report.backups.iter().map(|b| b.source_path.clone()).collect();
    assert_eq!(sources, vec![app.join("third_party/cef"), ws.install_dir()]);
    assert_eq!(report.restore.len(), 2);
    assert!(report.backups.iter().all(|b| b.archive_path.is_file()));
    assert_ne!(report.backups[0].archive_path, report.backups[1].archive_path);

    let readme = fs::read_to_string(ws.install_dir().join("README.txt")).unwrap();
    assert!(readme.contains(VERSION));
    assert!(app.join("user_settings.ini").is_file());
}

#[test]
fn test_unrecognized_install_target_is_never_replaced() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.install_dir()).unwrap();
    fs::write(ws.install_dir().join("notes.txt"), "keep me\n").unwrap();
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);

    let outcome = run(&ws.orchestrator(config, paths, acquire_only()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code, 32);
    assert!(report.backups.is_empty());
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Install), PhaseState::Failed);
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Verify), PhaseState::Skipped);
    assert!(report.failure.as_ref().unwrap().error.contains("not covered by a backup"));

    assert_eq!(fs::read_to_string(ws.install_dir().join("notes.txt")).unwrap(), "keep me\n");
    let entries: Vec<_> = fs::read_dir(ws.install_dir()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_download_failure_skips_dependents() {
    let ws = Workspace::new();
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, Some(ws.fake_cmake()));

    let outcome = run(&ws.orchestrator(config, paths, RunOptions::default()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code, 30);
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Download), PhaseState::Failed);
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Install), PhaseState::Skipped);
    assert_eq!(phase_state(report, WorkflowName::Acquire, PhaseName::Verify), PhaseState::Skipped);
    assert!(all_skipped(report, WorkflowName::Build));
    assert!(ws.runner.invocations().is_empty());
    assert!(!ws.install_dir().exists());
}

#[test]
fn test_dry_run_changes_nothing_outside_the_log() {
    let ws = Workspace::new();
    ws.seed_install(OLD_VERSION, Platform::Linux);
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config(
        "linux64",
        json!({
            "enable_mfc_integration": true,
            "mfc_solution_path": "app/App.sln",
            "mfc_binary_dir": "app/bin"
        }),
    );
    fs::write(ws.root().join("app/App.sln"), "").unwrap();
    let paths = ws.paths(&config, None);
    let log_dir = paths.log_dir.clone();
    let before = snapshot(ws.root(), &log_dir);

    let options = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let outcome = run(&ws.orchestrator(config, paths, options));
    let report = &outcome.report;

    assert!(report.dry_run);
    assert_eq!(report.exit_code, 0, "{}", report.to_text());
    assert_eq!(snapshot(ws.root(), &log_dir), before);
    assert_eq!(ws.http.download_calls(), 0);
    assert!(ws.runner.invocations().is_empty());

    assert_eq!(report.backups.len(), 1);
    assert!(report.backups[0].simulated);
    assert!(report.restore.is_empty());
    assert!(report.download.as_ref().unwrap().local_path.is_none());
    assert!(outcome.log_dir.starts_with(&log_dir));
    assert!(report.to_text().contains("[dry-run]"));
}

fn serve_cmake_release(ws: &Workspace) -> String {
    let version = "3.30.1";
    let tree = ws.root().join(".cmake-tree");
    fs::create_dir_all(tree.join("bin")).unwrap();
    fs::write(tree.join("bin/cmake"), b"#!/bin/sh\n").unwrap();
    let kind = cef_lane::toolchain::asset_kind(LINUX64.platform);
    let archive = ws.root().join(format!("cmake.{}", kind.extension()));
    cef_archive::create(kind, &tree, &release_dir_name(version, LINUX64).unwrap(), &archive).unwrap();
    let url = release_url(RELEASE_BASE_URL, version, LINUX64).unwrap();
    ws.http.serve(url.clone(), fs::read(&archive).unwrap());
    fs::remove_dir_all(&tree).unwrap();
    fs::remove_file(&archive).unwrap();
    url
}

/// Make `cmake --build` drop the wrapper library where CMake would
fn build_produces_wrapper(ws: &Workspace, build_dir: PathBuf) {
    ws.runner.on_run("--build", CommandOutput::default(), move |_| {
        let out = build_dir.join("libcef_dll_wrapper");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("libcef_dll_wrapper.a"), b"!<arch>\n").unwrap();
    });
}

#[test]
fn test_build_workflow_deploys_outputs() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, Some(ws.fake_cmake()));
    build_produces_wrapper(&ws, paths.build_dir.clone());
    let build_dir = paths.build_dir.clone();

    let outcome = run(&ws.orchestrator(config, paths, RunOptions::default()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Succeeded, "{}", report.to_text());
    for phase in [PhaseName::Toolchain, PhaseName::Configure, PhaseName::Build, PhaseName::Collect] {
        assert_eq!(phase_state(report, WorkflowName::Build, phase), PhaseState::Completed, "{}", phase);
    }
    assert_eq!(phase_state(report, WorkflowName::Build, PhaseName::Mutate), PhaseState::Skipped);

    let invocations = ws.runner.invocations();
    assert_eq!(invocations.len(), 2);
    let configure = invocations[0].to_string();
    assert!(configure.contains("-S"));
    assert!(configure.contains("Unix Makefiles"));
    assert!(configure.contains("-DCMAKE_BUILD_TYPE=Release"));
    assert!(invocations[0].args.contains(&ws.install_dir().to_string_lossy().to_string()));
    assert!(invocations[1].to_string().contains("--target libcef_dll_wrapper"));
    assert!(build_dir.is_dir());

    let out = ws.output_dir();
    for file in ["libcef.so", "libcef_dll_wrapper.a", "resources.pak", "icudtl.dat", "locales/en-US.pak", "include/cef_version.h"] {
        assert!(out.join(file).is_file(), "{}", file);
    }
    assert!(report.collection.as_ref().unwrap().missing_required().next().is_none());

    let commands = fs::read_to_string(outcome.log_dir.join(COMMANDS_FILE)).unwrap();
    assert!(commands.contains("--build"));
}

#[test]
fn test_build_failure_stops_collection() {
    let ws = Workspace::new();
    ws.seed_install(VERSION, Platform::Linux);
    ws.runner.exit("--build", 2);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, Some(ws.fake_cmake()));
    let options = RunOptions {
        skip_download: true,
        ..Default::default()
    };

    let outcome = run(&ws.orchestrator(config, paths, options));
    let report = &outcome.report;

    assert_eq!(report.exit_code, 50);
    assert!(all_skipped(report, WorkflowName::Acquire));
    assert_eq!(phase_state(report, WorkflowName::Build, PhaseName::Build), PhaseState::Failed);
    assert_eq!(phase_state(report, WorkflowName::Build, PhaseName::Collect), PhaseState::Skipped);
    assert_eq!(report.failure.as_ref().unwrap().phase, PhaseName::Build);
    assert!(!ws.output_dir().exists());
}

#[test]
fn test_missing_cmakelists_is_configuration_failure() {
    let ws = Workspace::new();
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, Some(ws.fake_cmake()));
    let options = RunOptions {
        skip_download: true,
        ..Default::default()
    };

    let outcome = run(&ws.orchestrator(config, paths, options));
    assert_eq!(outcome.report.exit_code, 41);
    assert!(ws.runner.invocations().is_empty());
}

#[test]
fn test_toolchain_is_downloaded_once() {
    let ws = Workspace::new();
    ws.seed_install(VERSION, Platform::Linux);
    let cmake_url = serve_cmake_release(&ws);
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);
    build_produces_wrapper(&ws, paths.build_dir.clone());
    let options = RunOptions {
        skip_download: true,
        ..Default::default()
    };

    let first = run(&ws.orchestrator(config.clone(), paths.clone(), options));
    assert_eq!(first.report.exit_code, 0, "{}", first.report.to_text());
    let cmake = first.report.toolchain.as_ref().unwrap().path.clone();
    assert!(cmake.is_file());
    assert!(cmake.starts_with(&paths.cmake_cache_dir));

    let second = run(&ws.orchestrator(config, paths, options));
    assert_eq!(second.report.exit_code, 0);
    assert_eq!(second.report.toolchain.as_ref().unwrap().path, cmake);

    let fetches = ws.http.requested_urls().iter().filter(|u| **u == cmake_url).count();
    assert_eq!(fetches, 1);
}

#[test]
fn test_integration_redeploys_runtime() {
    let ws = Workspace::new();
    ws.serve_distribution(VERSION, LINUX64);
    let config = ws.config(
        "linux64",
        json!({
            "enable_mfc_integration": true,
            "mfc_solution_path": "app/App.sln",
            "mfc_binary_dir": "app/bin",
            "mfc_cef_binary_dir": "app/third_party/cef"
        }),
    );
    fs::create_dir_all(ws.root().join("app")).unwrap();
    fs::write(ws.root().join("app/App.sln"), "").unwrap();
    let paths = ws.paths(&config, Some(ws.fake_cmake()));
    build_produces_wrapper(&ws, paths.build_dir.clone());

    let outcome = run(&ws.orchestrator(config, paths, RunOptions::default()));
    let report = &outcome.report;

    assert_eq!(report.status, RunStatus::Succeeded, "{}", report.to_text());
    assert_eq!(
        phase_state(report, WorkflowName::Integrate, PhaseName::SolutionBuild),
        PhaseState::Completed
    );
    assert_eq!(phase_state(report, WorkflowName::Integrate, PhaseName::Redeploy), PhaseState::Completed);
    assert_eq!(ws.runner.calls_matching("App.sln"), 1);

    let bin = ws.root().join("app/bin");
    assert!(bin.join("libcef.so").is_file());
    assert!(!bin.join("libcef_dll_wrapper.a").exists());
    assert!(ws.root().join("app/third_party/cef/include/cef_version.h").is_file());
}

#[test]
fn test_integration_skipped_when_build_fails() {
    let ws = Workspace::new();
    ws.seed_install(VERSION, Platform::Linux);
    ws.runner.exit("--build", 1);
    let config = ws.config(
        "linux64",
        json!({
            "enable_mfc_integration": true,
            "mfc_solution_path": "app/App.sln",
            "mfc_binary_dir": "app/bin"
        }),
    );
    let paths = ws.paths(&config, Some(ws.fake_cmake()));
    let options = RunOptions {
        skip_download: true,
        ..Default::default()
    };

    let outcome = run(&ws.orchestrator(config, paths, options));
    assert_eq!(outcome.report.exit_code, 50);
    assert!(all_skipped(&outcome.report, WorkflowName::Integrate));
}

#[test]
fn test_nothing_requested_skips_gate() {
    let ws = Workspace::new();
    let config = ws.config("linux64", json!({}));
    let paths = ws.paths(&config, None);
    let options = RunOptions {
        skip_download: true,
        skip_build: true,
        ..Default::default()
    };

    let outcome = run(&ws.orchestrator(config, paths, options));
    assert_eq!(outcome.report.exit_code, 0);
    assert_eq!(ws.http.total_calls(), 0);
    assert!(all_skipped(&outcome.report, WorkflowName::Preflight));
}

#[test]
fn test_download_url_matches_cdn_layout() {
    let ws = Workspace::new();
    let url = ws.serve_distribution(VERSION, WINDOWS64);
    assert_eq!(url, cdn_url(CDN_BASE_URL, &version(VERSION), WINDOWS64));
    assert!(url.ends_with(&format!("windows64_minimal.{}", archive_kind(WINDOWS64.platform).extension())));
    assert!(url.contains("%2Bchromium-"));
}
