//! Health aggregator: folds verdicts into one overall decision.

use vigil_core::config::AggregationPolicy;
use vigil_core::{
    HealthReport, Overall, ServiceStatus, ServiceVerdict, SubjectReport, Verdict, VerdictStatus,
};

fn fails(verdict: &Verdict, policy: &AggregationPolicy) -> bool {
    match verdict.status {
        VerdictStatus::Alert => true,
        VerdictStatus::NoData => policy.fail_on_no_data,
        VerdictStatus::Ok | VerdictStatus::Skipped => false,
    }
}

fn decision(attention: bool) -> Overall {
    if attention {
        Overall::Attention
    } else {
        Overall::Healthy
    }
}

/// Fleet status: `Attention` if any non-skipped target has a failing
/// verdict. Skipped targets never count.
pub fn overall_fleet_status(subjects: &[SubjectReport], policy: &AggregationPolicy) -> Overall {
    decision(
        subjects
            .iter()
            .filter(|s| !s.is_skipped())
            .flat_map(|s| s.verdicts.iter())
            .any(|v| fails(v, policy)),
    )
}

/// Cloud path: per-target verdicts plus the fleet status.
pub fn aggregate_fleet(subjects: Vec<SubjectReport>, policy: &AggregationPolicy) -> HealthReport {
    let overall = overall_fleet_status(&subjects, policy);
    HealthReport {
        subjects,
        services: Vec::new(),
        overall,
    }
}

/// Local path: host metric verdicts plus service verdicts.
///
/// `Attention` if any metric fails or any service is not running.
pub fn aggregate_local(
    host: SubjectReport,
    services: Vec<ServiceVerdict>,
    policy: &AggregationPolicy,
) -> HealthReport {
    let metric_failed = host.verdicts.iter().any(|v| fails(v, policy));
    let service_down = services
        .iter()
        .any(|s| s.status == ServiceStatus::NotRunning);

    HealthReport {
        subjects: vec![host],
        services,
        overall: decision(metric_failed || service_down),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::TargetState;

    fn verdict(subject: &str, label: &str, status: VerdictStatus, value: Option<f64>) -> Verdict {
        Verdict {
            subject: subject.to_string(),
            metric_label: label.to_string(),
            status,
            value,
        }
    }

    fn subject(id: &str, state: TargetState, statuses: &[VerdictStatus]) -> SubjectReport {
        SubjectReport {
            subject: id.to_string(),
            state,
            verdicts: statuses
                .iter()
                .map(|s| verdict(id, "m", *s, Some(1.0)))
                .collect(),
        }
    }

    fn service(name: &str, status: ServiceStatus) -> ServiceVerdict {
        ServiceVerdict {
            service: name.to_string(),
            status,
            detail: None,
        }
    }

    #[test]
    fn fleet_healthy_when_all_ok_and_stopped_skipped() {
        let subjects = vec![
            subject("i-aaa", TargetState::Stopped, &[VerdictStatus::Skipped]),
            subject("i-bbb", TargetState::Running, &[VerdictStatus::Ok, VerdictStatus::Ok]),
        ];
        let report = aggregate_fleet(subjects, &AggregationPolicy::default());
        assert_eq!(report.overall, Overall::Healthy);
        assert!(report.services.is_empty());
    }

    #[test]
    fn fleet_attention_on_any_alert() {
        let subjects = vec![
            subject("i-aaa", TargetState::Running, &[VerdictStatus::Ok]),
            subject("i-bbb", TargetState::Running, &[VerdictStatus::Ok, VerdictStatus::Alert]),
        ];
        assert_eq!(
            overall_fleet_status(&subjects, &AggregationPolicy::default()),
            Overall::Attention
        );
    }

    #[test]
    fn no_data_folds_only_when_policy_says_so() {
        let subjects = vec![subject("i-aaa", TargetState::Running, &[VerdictStatus::NoData])];
        assert_eq!(
            overall_fleet_status(&subjects, &AggregationPolicy::default()),
            Overall::Healthy
        );
        let strict = AggregationPolicy { fail_on_no_data: true };
        assert_eq!(overall_fleet_status(&subjects, &strict), Overall::Attention);
    }

    #[test]
    fn local_service_down_means_attention() {
        let host = subject(
            "web-1",
            TargetState::Running,
            &[VerdictStatus::Ok, VerdictStatus::Ok, VerdictStatus::Ok],
        );
        let report = aggregate_local(
            host,
            vec![service("sshd", ServiceStatus::NotRunning)],
            &AggregationPolicy::default(),
        );
        assert_eq!(report.overall, Overall::Attention);
    }

    #[test]
    fn local_healthy_when_everything_passes() {
        let host = subject("web-1", TargetState::Running, &[VerdictStatus::Ok]);
        let report = aggregate_local(
            host,
            vec![service("sshd", ServiceStatus::Running)],
            &AggregationPolicy::default(),
        );
        assert_eq!(report.overall, Overall::Healthy);
        assert_eq!(report.subjects.len(), 1);
    }

    #[test]
    fn local_alert_means_attention() {
        let host = subject("web-1", TargetState::Running, &[VerdictStatus::Alert]);
        let report = aggregate_local(host, vec![], &AggregationPolicy::default());
        assert_eq!(report.overall, Overall::Attention);
    }
}
