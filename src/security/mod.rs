//! Vulnerability gate
//!
//! Queries OSV for the requested framework version before anything touches
//! the filesystem. CRITICAL or HIGH findings abort the run unconditionally;
//! MEDIUM/LOW findings are advisories; a failed query is reported as
//! "unavailable" and never treated as clean.

pub mod osv;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use cef_version::VersionDescriptor;

use crate::http::HttpClient;

/// Closed severity scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// CRITICAL and HIGH block the run
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// One advisory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub summary: String,
    pub reference_url: String,
}

/// All findings for one version; empty means clean
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub version: String,
    pub findings: Vec<Finding>,
}

impl VulnerabilityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings at CRITICAL or HIGH
    pub fn blocking(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity.is_blocking())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Add a finding unless one with the same id is present
    fn push_unique(&mut self, finding: Finding) {
        if !self.findings.iter().any(|f| f.id == finding.id) {
            self.findings.push(finding);
        }
    }
}

/// Non-aborting gate outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    /// No known vulnerabilities
    Clean(VulnerabilityReport),
    /// Only MEDIUM/LOW findings
    Advisory(VulnerabilityReport),
    /// The vulnerability source could not be queried; operator judgement required
    Unavailable { reason: String },
}

impl GateVerdict {
    pub fn report(&self) -> Option<&VulnerabilityReport> {
        match self {
            GateVerdict::Clean(r) | GateVerdict::Advisory(r) => Some(r),
            GateVerdict::Unavailable { .. } => None,
        }
    }

    /// Whether the verdict should be surfaced as a run warning
    pub fn is_warning(&self) -> bool {
        !matches!(self, GateVerdict::Clean(_))
    }
}

/// The run must stop: blocking vulnerabilities found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAbort {
    pub report: VulnerabilityReport,
}

impl SecurityAbort {
    /// Identifiers of the CRITICAL/HIGH findings
    pub fn blocking_ids(&self) -> Vec<String> {
        self.report.blocking().map(|f| f.id.clone()).collect()
    }
}

impl fmt::Display for SecurityAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = self.blocking_ids();
        write!(
            f,
            "{} blocking vulnerabilit{} in CEF {}: {}",
            ids.len(),
            if ids.len() == 1 { "y" } else { "ies" },
            self.report.version,
            ids.join(", ")
        )
    }
}

impl std::error::Error for SecurityAbort {}

/// Vulnerability gate over the OSV query API
pub struct VulnerabilityGate {
    http: Arc<dyn HttpClient>,
    endpoint: String,
}

impl VulnerabilityGate {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_endpoint(http, osv::OSV_QUERY_URL)
    }

    pub fn with_endpoint(http: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Query every package name and apply the abort policy
    pub fn check(&self, version: &VersionDescriptor) -> Result<GateVerdict, SecurityAbort> {
        let version_str = version.to_string();
        let mut report = VulnerabilityReport {
            version: version_str.clone(),
            findings: Vec::new(),
        };
        let mut failure: Option<String> = None;

        for package in osv::PACKAGE_NAMES {
            let body = osv::query_body(package, &version_str);
            let parsed = self
                .http
                .post_json(&self.endpoint, &body)
                .map_err(|e| e.to_string())
                .and_then(|response| osv::parse_response(&response));
            match parsed {
                Ok(findings) => {
                    for finding in findings {
                        report.push_unique(finding);
                    }
                }
                Err(reason) => {
                    tracing::warn!(package, %reason, "vulnerability query failed");
                    failure.get_or_insert(format!("{}: {}", package, reason));
                }
            }
        }

        // Blocking findings abort even if another query failed
        if report.blocking().next().is_some() {
            tracing::error!(
                critical = report.count(Severity::Critical),
                high = report.count(Severity::High),
                "blocking vulnerabilities found"
            );
            return Err(SecurityAbort { report });
        }

        if let Some(reason) = failure {
            return Ok(GateVerdict::Unavailable { reason });
        }

        if report.is_clean() {
            tracing::info!(version = %version_str, "no known vulnerabilities");
            Ok(GateVerdict::Clean(report))
        } else {
            tracing::warn!(
                findings = report.findings.len(),
                "only medium/low vulnerabilities found, proceeding"
            );
            Ok(GateVerdict::Advisory(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpError;
    use crate::mock::MockHttp;
    use serde_json::json;

    fn version() -> VersionDescriptor {
        VersionDescriptor::parse("120.1.10+g3ce3184+chromium-120.0.6099.129").unwrap()
    }

    fn gate(http: &Arc<MockHttp>) -> VulnerabilityGate {
        VulnerabilityGate::new(http.clone())
    }

    #[test]
    fn test_clean_report() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Ok(json!({})));
        http.push_json(Ok(json!({"vulns": []})));

        let verdict = gate(&http).check(&version()).unwrap();
        assert!(matches!(verdict, GateVerdict::Clean(ref r) if r.is_clean()));
        assert!(!verdict.is_warning());
        assert_eq!(http.post_calls(), 2);
    }

    #[test]
    fn test_critical_aborts() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Ok(json!({"vulns": [
            {"id": "OSV-CRIT", "summary": "RCE", "database_specific": {"severity": "CRITICAL"}},
            {"id": "OSV-LOW", "summary": "info leak", "database_specific": {"cvss_score": 2.0}}
        ]})));
        http.push_json(Ok(json!({})));

        let abort = gate(&http).check(&version()).unwrap_err();
        assert_eq!(abort.blocking_ids(), vec!["OSV-CRIT".to_string()]);
        assert!(abort.to_string().contains("OSV-CRIT"));
        assert!(abort.to_string().contains("1 blocking vulnerability"));
    }

    #[test]
    fn test_medium_is_advisory() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Ok(json!({"vulns": [{"id": "OSV-MED", "summary": "x"}]})));
        http.push_json(Ok(json!({"vulns": [{"id": "OSV-MED", "summary": "x"}]})));

        let verdict = gate(&http).check(&version()).unwrap();
        match verdict {
            GateVerdict::Advisory(report) => {
                // deduplicated across package queries
                assert_eq!(report.findings.len(), 1);
                assert_eq!(report.findings[0].severity, Severity::Medium);
            }
            other => panic!("expected advisory, got {:?}", other),
        }
    }

    #[test]
    fn test_network_failure_is_unavailable_not_clean() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Err(HttpError::Connect("dns failure".into())));
        http.push_json(Ok(json!({})));

        let verdict = gate(&http).check(&version()).unwrap();
        match verdict {
            GateVerdict::Unavailable { reason } => assert!(reason.contains("dns failure")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_failure_is_unavailable() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Ok(json!("garbage")));
        http.push_json(Ok(json!({})));

        let verdict = gate(&http).check(&version()).unwrap();
        assert!(matches!(verdict, GateVerdict::Unavailable { .. }));
        assert!(verdict.is_warning());
    }

    #[test]
    fn test_blocking_wins_over_unavailable() {
        let http = Arc::new(MockHttp::new());
        http.push_json(Ok(json!({"vulns": [
            {"id": "OSV-HIGH", "database_specific": {"cvss_score": 7.1}}
        ]})));
        http.push_json(Err(HttpError::Timeout("slow".into())));

        assert!(gate(&http).check(&version()).is_err());
    }
}
