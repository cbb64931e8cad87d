use serde::Serialize;
use tably_core::config::{AppConfig, LoadOptions, PaymentProvider};

use crate::commands;

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_payment_gateway(&config),
            check_database_connectivity(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("payment_gateway_readiness"),
            DoctorCheck::skipped("database_connectivity"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    DoctorReport {
        overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
        summary: if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        },
        checks,
    }
}

fn check_payment_gateway(config: &AppConfig) -> DoctorCheck {
    match config.payments.provider {
        PaymentProvider::Noop => DoctorCheck::pass(
            "payment_gateway_readiness",
            "noop gateway selected; no credentials required",
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match commands::current_thread_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(_) => {
            return DoctorCheck::fail(
                "database_connectivity",
                "failed to initialize async runtime",
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = commands::open_pool(config).await?;
        pool.close().await;
        Ok::<(), commands::StepError>(())
    });

    match result {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err((_, message, _)) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to connect to database: {message}"),
        ),
    }
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
