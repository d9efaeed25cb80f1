use std::time::Duration;

use counsel_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::CommandResult;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 3 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_enhancement(&config));
            checks.extend(probe_services(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["enhancement_mode", "advice_service_reachability", "permission_service_reachability"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_enhancement(config: &AppConfig) -> DoctorCheck {
    let details = if config.enhancement.bypass {
        "bypass: advice is reformatted locally".to_string()
    } else {
        format!("model `{}` via {}", config.model.model_id, config.model.endpoint_base())
    };
    DoctorCheck { name: "enhancement_mode", status: CheckStatus::Pass, details }
}

/// Any HTTP response counts as reachable; only transport failures fail the probe.
fn probe_services(config: &AppConfig) -> Vec<DoctorCheck> {
    let targets = [
        ("advice_service_reachability", config.advice.url.clone()),
        ("permission_service_reachability", config.permissions.base_url.clone()),
    ];

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return targets
                .into_iter()
                .map(|(name, _)| DoctorCheck {
                    name,
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                })
                .collect();
        }
    };

    runtime.block_on(async {
        let client = reqwest::Client::new();
        let mut checks = Vec::with_capacity(targets.len());
        for (name, url) in targets {
            let check = match client.get(&url).timeout(PROBE_TIMEOUT).send().await {
                Ok(response) => DoctorCheck {
                    name,
                    status: CheckStatus::Pass,
                    details: format!("`{url}` answered with status {}", response.status().as_u16()),
                },
                Err(error) => DoctorCheck {
                    name,
                    status: CheckStatus::Fail,
                    details: format!("`{url}` unreachable: {error}"),
                },
            };
            checks.push(check);
        }
        checks
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
