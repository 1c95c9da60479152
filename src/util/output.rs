use std::path::Path;

use crate::error::TriageResult;
use crate::simulation::SimulationReport;

pub fn print_report(report: &SimulationReport) {
    println!("Queue mode: {:?}", report.mode);
    println!("Arrival pattern: {:?} (seed {})", report.pattern, report.seed);
    println!("----------------------------------------");
    println!(
        "Admitted {}\tDispatched {}\tStill waiting {}\tTicks {}",
        report.admitted, report.dispatched, report.still_waiting, report.ticks
    );
    println!("Mean wait {:.1}\tMax wait {}", report.mean_wait, report.max_wait);
    println!();

    for (band, wait) in &report.wait_by_severity {
        println!("{:<12}\tmean wait {:.1}", band, wait);
    }
    println!();

    for (resolution, count) in &report.resolutions {
        println!("{:<18}\t{}", resolution, count);
    }
    println!();

    for doctor in &report.doctors {
        println!(
            "Doctor {}\t{} patients\t{} minutes\tefficiency {:.2}",
            doctor.id, doctor.patients_seen, doctor.interaction_time, doctor.efficiency
        );
    }
    println!("----------------------------------------");
}

pub fn save_report(report: &SimulationReport, output_path: impl AsRef<Path>) -> TriageResult<()> {
    std::fs::write(output_path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArrivalPattern, QueueMode, SimulationConfig, TriageConfig};
    use crate::simulation::simulate;

    #[test]
    fn saved_report_is_valid_json() {
        let config = SimulationConfig {
            triage: TriageConfig::with_mode(QueueMode::Multi),
            arrival_ticks: 30,
            pattern: ArrivalPattern::Random,
            show_progress: false,
            ..SimulationConfig::default()
        };
        let report = simulate(&config).unwrap();

        let path = std::env::temp_dir().join(format!("desert-report-{}.json", std::process::id()));
        save_report(&report, &path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(value["mode"], "multi");
        assert_eq!(value["dispatched"], report.dispatched);
        assert_eq!(
            value["dispatch_log"].as_array().unwrap().len(),
            report.dispatch_log.len()
        );
    }
}
