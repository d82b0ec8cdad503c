//! OSV.dev query protocol and severity mapping

use serde_json::{json, Value};

use super::{Finding, Severity};

/// OSV query endpoint
pub const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";

/// Package names CEF advisories are filed under
pub const PACKAGE_NAMES: &[&str] = &["chromium-embedded-framework", "cef"];

/// Ecosystem used for the package queries
pub const ECOSYSTEM: &str = "OSS-Fuzz";

/// Request body for one package/version pair
pub fn query_body(package: &str, version: &str) -> Value {
    json!({
        "package": {"name": package, "ecosystem": ECOSYSTEM},
        "version": version
    })
}

/// Parse a query response into findings.
///
/// A response without `vulns` is a clean answer; anything that is not a
/// JSON object is malformed.
pub fn parse_response(response: &Value) -> Result<Vec<Finding>, String> {
    let object = response
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;
    let vulns = match object.get("vulns") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(vulns)) => vulns,
        Some(_) => return Err("'vulns' is not an array".to_string()),
    };

    vulns
        .iter()
        .map(|vuln| {
            let id = vuln
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| "vulnerability without an id".to_string())?;
            let summary = vuln
                .get("summary")
                .or_else(|| vuln.get("details"))
                .and_then(Value::as_str)
                .unwrap_or("No summary available")
                .to_string();
            Ok(Finding {
                id: id.to_string(),
                severity: severity_of(vuln),
                summary,
                reference_url: format!("https://osv.dev/vulnerability/{}", id),
            })
        })
        .collect()
}

/// Map an OSV record onto the closed severity scale.
///
/// Order: `database_specific.severity` label, top-level `severity` label,
/// `database_specific.cvss_score`, numeric `severity[].score`. Records with
/// none of these are MEDIUM.
pub fn severity_of(vuln: &Value) -> Severity {
    let db = vuln.get("database_specific");

    let label = db
        .and_then(|d| d.get("severity"))
        .and_then(Value::as_str)
        .or_else(|| vuln.get("severity").and_then(Value::as_str));
    if let Some(severity) = label.and_then(severity_from_label) {
        return severity;
    }

    if let Some(score) = db.and_then(|d| d.get("cvss_score")).and_then(number) {
        return severity_from_score(score);
    }

    if let Some(entries) = vuln.get("severity").and_then(Value::as_array) {
        if let Some(score) = entries
            .iter()
            .filter_map(|e| e.get("score").and_then(number))
            .reduce(f64::max)
        {
            return severity_from_score(score);
        }
    }

    Severity::Medium
}

fn severity_from_label(label: &str) -> Option<Severity> {
    match label.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" => Some(Severity::Critical),
        "HIGH" => Some(Severity::High),
        "MEDIUM" | "MODERATE" => Some(Severity::Medium),
        "LOW" => Some(Severity::Low),
        _ => None,
    }
}

/// CVSS base score bands
pub fn severity_from_score(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A number, or a string holding one (CVSS vectors are not numbers)
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
