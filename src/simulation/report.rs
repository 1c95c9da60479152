use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::config::{ArrivalPattern, QueueMode, SimulationConfig};
use crate::dispatch::DispatchRecord;
use crate::model::doctor::Doctor;
use crate::scheduler::TriageScheduler;

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub mode: QueueMode,
    pub pattern: ArrivalPattern,
    pub seed: u64,
    pub ticks: u64,
    pub admitted: u64,
    pub dispatched: usize,
    pub still_waiting: usize,
    pub mean_wait: f64,
    pub max_wait: u64,
    pub wait_by_severity: BTreeMap<String, f64>,
    pub resolutions: BTreeMap<String, usize>,
    pub doctors: Vec<Doctor>,
    pub dispatch_log: Vec<DispatchRecord>,
}

impl SimulationReport {
    pub(crate) fn new(
        config: &SimulationConfig,
        scheduler: &TriageScheduler,
        doctors: Vec<Doctor>,
        ticks: u64,
    ) -> SimulationReport {
        let log = scheduler.log().to_vec();
        let snapshot = scheduler.snapshot();

        let mean_wait = mean(log.iter().map(|r| r.waited));
        let max_wait = log.iter().map(|r| r.waited).max().unwrap_or(0);

        let wait_by_severity = log
            .iter()
            .into_group_map_by(|r| severity_band(r.patient.severity))
            .into_iter()
            .map(|(band, records)| (band.to_string(), mean(records.iter().map(|r| r.waited))))
            .collect();

        let resolutions = log
            .iter()
            .into_group_map_by(|r| r.resolution.as_str())
            .into_iter()
            .map(|(resolution, records)| (resolution.to_string(), records.len()))
            .collect();

        SimulationReport {
            mode: config.triage.mode,
            pattern: config.pattern,
            seed: config.seed,
            ticks,
            admitted: snapshot.admitted,
            dispatched: snapshot.dispatched,
            still_waiting: snapshot.waiting,
            mean_wait,
            max_wait,
            wait_by_severity,
            resolutions,
            doctors,
            dispatch_log: log,
        }
    }
}

pub fn severity_band(severity: u32) -> &'static str {
    match severity {
        125..=u32::MAX => "critical",
        100..=124 => "emergent",
        75..=99 => "urgent",
        50..=74 => "less_urgent",
        _ => "non_urgent",
    }
}

fn mean(values: impl Iterator<Item = u64>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriageConfig;
    use crate::model::patient::{ArrivalEvent, MAX_ACUITY, MAX_PAIN_SCORE, MIN_ACUITY};

    #[test]
    fn bands_cover_every_severity() {
        assert_eq!(severity_band(145), "critical");
        assert_eq!(severity_band(125), "critical");
        assert_eq!(severity_band(120), "emergent");
        assert_eq!(severity_band(99), "urgent");
        assert_eq!(severity_band(70), "less_urgent");
        assert_eq!(severity_band(45), "non_urgent");
        assert_eq!(severity_band(25), "non_urgent");
    }

    #[test]
    fn each_band_holds_exactly_one_acuity_level() {
        for acuity in MIN_ACUITY..=MAX_ACUITY {
            let calm = severity_band(ArrivalEvent::new(acuity, 0, 5).severity_score());
            let agony = severity_band(ArrivalEvent::new(acuity, MAX_PAIN_SCORE, 5).severity_score());
            assert_eq!(calm, agony, "acuity {acuity}");
        }
    }

    #[test]
    fn report_aggregates_waits() {
        let config = SimulationConfig {
            triage: TriageConfig::with_mode(QueueMode::Single),
            ..SimulationConfig::default()
        };
        let mut scheduler = TriageScheduler::new(&config.triage).unwrap();
        scheduler.admit(&ArrivalEvent::new(1, 10, 10), 0).unwrap();
        scheduler.admit(&ArrivalEvent::new(5, 0, 10), 0).unwrap();
        scheduler.admit(&ArrivalEvent::new(5, 1, 10), 0).unwrap();
        scheduler.select_and_dispatch(2).unwrap();
        scheduler.select_and_dispatch(6).unwrap();

        let report = SimulationReport::new(&config, &scheduler, Vec::new(), 10);
        assert_eq!(report.admitted, 3);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.still_waiting, 1);
        assert_eq!(report.max_wait, 6);
        assert!((report.mean_wait - 4.0).abs() < 1e-9);
        assert_eq!(report.wait_by_severity["critical"], 2.0);
        assert_eq!(report.wait_by_severity["non_urgent"], 6.0);
        assert_eq!(report.resolutions["head"], 2);
    }
}
