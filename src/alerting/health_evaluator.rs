//! Threshold evaluation of agent health reports.
//!
//! Everything here is pure: metrics in, issues and an overall status out. Each
//! component contributes at most one issue per report, carrying the most severe
//! threshold it breaches.

use serde::{Deserialize, Serialize};

use crate::db::enums::HealthStatus;

pub const DISK_CRITICAL_PERCENT: f64 = 90.0;
pub const DISK_WARNING_PERCENT: f64 = 80.0;
pub const MEMORY_CRITICAL_PERCENT: f64 = 95.0;
pub const MEMORY_WARNING_PERCENT: f64 = 85.0;
pub const CPU_CRITICAL_PERCENT: f64 = 95.0;
pub const CPU_WARNING_PERCENT: f64 = 80.0;

/// Status the agent claims for itself in a health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

impl ReportedStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "healthy" => Some(ReportedStatus::Healthy),
            "unhealthy" => Some(ReportedStatus::Unhealthy),
            "degraded" => Some(ReportedStatus::Degraded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub disk_free_bytes: Option<i64>,
    pub network_up: Option<bool>,
    pub restic_available: Option<bool>,
    pub restic_version: Option<String>,
    pub uptime_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub component: String,
    pub severity: IssueSeverity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthEvaluation {
    pub issues: Vec<HealthIssue>,
    pub status: HealthStatus,
}

fn check_percentage(
    component: &str,
    label: &str,
    value: Option<f64>,
    critical: f64,
    warning: f64,
) -> Option<HealthIssue> {
    let value = value?;
    let (severity, threshold) = if value >= critical {
        (IssueSeverity::Critical, critical)
    } else if value >= warning {
        (IssueSeverity::Warning, warning)
    } else {
        return None;
    };
    let level = match severity {
        IssueSeverity::Critical => "critically high",
        IssueSeverity::Warning => "high",
    };
    Some(HealthIssue {
        component: component.to_string(),
        severity,
        message: format!("{label} usage is {level}: {value:.1}% (threshold {threshold:.0}%)"),
        value: Some(value),
        threshold: Some(threshold),
    })
}

fn check_flag(component: &str, flag: Option<bool>, message: &str) -> Option<HealthIssue> {
    match flag {
        Some(false) => Some(HealthIssue {
            component: component.to_string(),
            severity: IssueSeverity::Warning,
            message: message.to_string(),
            value: None,
            threshold: None,
        }),
        _ => None,
    }
}

/// Lists the threshold breaches in a metrics snapshot, in component order.
pub fn collect_issues(metrics: Option<&HealthMetrics>) -> Vec<HealthIssue> {
    let Some(metrics) = metrics else {
        return Vec::new();
    };

    [
        check_percentage(
            "disk",
            "Disk",
            metrics.disk_usage,
            DISK_CRITICAL_PERCENT,
            DISK_WARNING_PERCENT,
        ),
        check_percentage(
            "memory",
            "Memory",
            metrics.memory_usage,
            MEMORY_CRITICAL_PERCENT,
            MEMORY_WARNING_PERCENT,
        ),
        check_percentage(
            "cpu",
            "CPU",
            metrics.cpu_usage,
            CPU_CRITICAL_PERCENT,
            CPU_WARNING_PERCENT,
        ),
        check_flag("network", metrics.network_up, "Network connectivity is unavailable"),
        check_flag(
            "restic",
            metrics.restic_available,
            "Restic binary is not available on the agent",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Resolves the overall status. First match wins: an explicit "unhealthy" report,
/// then critical issues, then warning issues, then a self-reported "degraded".
pub fn resolve_status(reported: ReportedStatus, issues: &[HealthIssue]) -> HealthStatus {
    if reported == ReportedStatus::Unhealthy {
        return HealthStatus::Critical;
    }
    if issues.iter().any(|i| i.severity == IssueSeverity::Critical) {
        return HealthStatus::Critical;
    }
    if issues.iter().any(|i| i.severity == IssueSeverity::Warning) {
        return HealthStatus::Warning;
    }
    if reported == ReportedStatus::Degraded {
        return HealthStatus::Warning;
    }
    HealthStatus::Healthy
}

pub fn evaluate(metrics: Option<&HealthMetrics>, reported: ReportedStatus) -> HealthEvaluation {
    let issues = collect_issues(metrics);
    let status = resolve_status(reported, &issues);
    HealthEvaluation { issues, status }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> HealthMetrics {
        HealthMetrics {
            cpu_usage: Some(10.0),
            memory_usage: Some(50.0),
            disk_usage: Some(40.0),
            network_up: Some(true),
            restic_available: Some(true),
            ..Default::default()
        }
    }

    fn severity_rank(status: HealthStatus) -> u8 {
        match status {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }

    #[test]
    fn test_no_metrics_yields_no_issues() {
        let eval = evaluate(None, ReportedStatus::Healthy);
        assert!(eval.issues.is_empty());
        assert_eq!(eval.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_disk_critical_scenario() {
        let metrics = HealthMetrics {
            disk_usage: Some(92.0),
            ..baseline()
        };
        let eval = evaluate(Some(&metrics), ReportedStatus::Healthy);
        assert_eq!(eval.issues.len(), 1);
        let issue = &eval.issues[0];
        assert_eq!(issue.component, "disk");
        assert_eq!(issue.severity, IssueSeverity::Critical);
        assert_eq!(issue.threshold, Some(90.0));
        assert_eq!(issue.value, Some(92.0));
        assert_eq!(eval.status, HealthStatus::Critical);
    }

    #[test]
    fn test_threshold_boundaries() {
        let cases = [
            // (disk, memory, cpu, expected component severities)
            (79.9, 84.9, 79.9, vec![]),
            (80.0, 50.0, 10.0, vec![("disk", IssueSeverity::Warning)]),
            (89.9, 50.0, 10.0, vec![("disk", IssueSeverity::Warning)]),
            (90.0, 50.0, 10.0, vec![("disk", IssueSeverity::Critical)]),
            (40.0, 85.0, 10.0, vec![("memory", IssueSeverity::Warning)]),
            (40.0, 94.9, 10.0, vec![("memory", IssueSeverity::Warning)]),
            (40.0, 95.0, 10.0, vec![("memory", IssueSeverity::Critical)]),
            (40.0, 50.0, 80.0, vec![("cpu", IssueSeverity::Warning)]),
            (40.0, 50.0, 95.0, vec![("cpu", IssueSeverity::Critical)]),
        ];

        for (disk, memory, cpu, expected) in cases {
            let metrics = HealthMetrics {
                disk_usage: Some(disk),
                memory_usage: Some(memory),
                cpu_usage: Some(cpu),
                ..baseline()
            };
            let got: Vec<(String, IssueSeverity)> = collect_issues(Some(&metrics))
                .into_iter()
                .map(|i| (i.component, i.severity))
                .collect();
            let expected: Vec<(String, IssueSeverity)> = expected
                .into_iter()
                .map(|(c, s)| (c.to_string(), s))
                .collect();
            assert_eq!(got, expected, "disk={disk} memory={memory} cpu={cpu}");
        }
    }

    #[test]
    fn test_one_issue_per_component() {
        let metrics = HealthMetrics {
            disk_usage: Some(99.0),
            memory_usage: Some(99.0),
            cpu_usage: Some(99.0),
            network_up: Some(false),
            restic_available: Some(false),
            ..Default::default()
        };
        let issues = collect_issues(Some(&metrics));
        let components: Vec<&str> = issues.iter().map(|i| i.component.as_str()).collect();
        assert_eq!(components, vec!["disk", "memory", "cpu", "network", "restic"]);
        assert!(issues[..3].iter().all(|i| i.severity == IssueSeverity::Critical));
        assert!(issues[3..].iter().all(|i| i.severity == IssueSeverity::Warning));
    }

    #[test]
    fn test_flags_only_trigger_when_explicitly_false() {
        let metrics = HealthMetrics {
            network_up: None,
            restic_available: Some(false),
            ..Default::default()
        };
        let issues = collect_issues(Some(&metrics));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].component, "restic");
        assert_eq!(issues[0].threshold, None);
        assert_eq!(evaluate(Some(&metrics), ReportedStatus::Healthy).status, HealthStatus::Warning);
    }

    #[test]
    fn test_raising_a_metric_never_lowers_severity() {
        let steps: Vec<f64> = (0..=100).map(f64::from).collect();
        for component in ["disk", "memory", "cpu"] {
            let mut last = 0;
            for value in &steps {
                let mut metrics = baseline();
                match component {
                    "disk" => metrics.disk_usage = Some(*value),
                    "memory" => metrics.memory_usage = Some(*value),
                    _ => metrics.cpu_usage = Some(*value),
                }
                let rank = severity_rank(evaluate(Some(&metrics), ReportedStatus::Healthy).status);
                assert!(rank >= last, "{component} at {value} lowered severity");
                last = rank;
            }
            assert_eq!(last, 2);
        }
    }

    #[test]
    fn test_status_precedence() {
        assert_eq!(resolve_status(ReportedStatus::Unhealthy, &[]), HealthStatus::Critical);
        assert_eq!(resolve_status(ReportedStatus::Degraded, &[]), HealthStatus::Warning);
        assert_eq!(resolve_status(ReportedStatus::Healthy, &[]), HealthStatus::Healthy);

        let critical = collect_issues(Some(&HealthMetrics {
            cpu_usage: Some(97.0),
            ..baseline()
        }));
        assert_eq!(resolve_status(ReportedStatus::Degraded, &critical), HealthStatus::Critical);

        let warning = collect_issues(Some(&HealthMetrics {
            network_up: Some(false),
            ..baseline()
        }));
        assert_eq!(resolve_status(ReportedStatus::Healthy, &warning), HealthStatus::Warning);
        assert_eq!(resolve_status(ReportedStatus::Unhealthy, &warning), HealthStatus::Critical);
    }

    #[test]
    fn test_reported_status_parse() {
        assert_eq!(ReportedStatus::parse("degraded"), Some(ReportedStatus::Degraded));
        assert_eq!(ReportedStatus::parse("Healthy"), None);
        assert_eq!(ReportedStatus::parse("down"), None);
    }
}
