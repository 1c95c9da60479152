use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;

use desert_triage::config::{load_simulation_config, QueueMode, SimulationConfig, TriageConfig};
use desert_triage::model::patient::ArrivalEvent;
use desert_triage::service::SchedulerService;
use desert_triage::simulation::{compare_modes, simulate};
use desert_triage::topology::{topology_for, JsonExport, TopologyRenderer};
use desert_triage::util::output::{print_report, save_report};
use desert_triage::{TriageError, TriageResult};

const DEFAULT_PRODUCERS: usize = 4;
const DEFAULT_DEMO_PATIENTS: usize = 200;
const DEMO_DOCTORS: usize = 3;
const PRODUCER_BACKOFF: Duration = Duration::from_millis(2);

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} simulate [<config.json>] [--out <report.json>] [--compare]\n  {program} demo [--producers <n>] [--patients <n>]\n  {program} topology [single|multi]\n\nEnvironment overrides: DESERT_MODE, DESERT_INGRESS_CAPACITY, DESERT_OVERFLOW, DESERT_SEED, DESERT_DOCTORS."
    );
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Simulate {
        config: Option<String>,
        out: Option<String>,
        compare: bool,
    },
    Demo {
        producers: usize,
        patients: usize,
    },
    Topology {
        mode: QueueMode,
    },
}

fn parse_args(args: &[String]) -> Result<CliCommand, String> {
    let mut args = args.iter();
    match args.next().map(String::as_str) {
        Some("simulate") => {
            let mut config = None;
            let mut out = None;
            let mut compare = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--out" => out = Some(args.next().ok_or("--out requires a path")?.clone()),
                    "--compare" => compare = true,
                    flag if flag.starts_with("--") => return Err(format!("unknown flag {flag}")),
                    path if config.is_none() => config = Some(path.to_string()),
                    extra => return Err(format!("unexpected argument {extra}")),
                }
            }
            Ok(CliCommand::Simulate { config, out, compare })
        }
        Some("demo") => {
            let mut producers = DEFAULT_PRODUCERS;
            let mut patients = DEFAULT_DEMO_PATIENTS;
            while let Some(arg) = args.next() {
                let value = args.next().ok_or(format!("{arg} requires a value"))?;
                let value = value
                    .parse::<usize>()
                    .map_err(|_| format!("{arg}: not a number: {value}"))?;
                match arg.as_str() {
                    "--producers" => producers = value.max(1),
                    "--patients" => patients = value,
                    other => return Err(format!("unknown flag {other}")),
                }
            }
            Ok(CliCommand::Demo { producers, patients })
        }
        Some("topology") => {
            let mode = match args.next() {
                Some(mode) => mode.parse::<QueueMode>().map_err(|e| e.to_string())?,
                None => QueueMode::Multi,
            };
            Ok(CliCommand::Topology { mode })
        }
        Some(other) => Err(format!("unknown command {other}")),
        None => Err("missing command".to_string()),
    }
}

fn run_simulation(config_path: Option<String>, out: Option<String>, compare: bool) -> TriageResult<()> {
    let mut config = match config_path {
        Some(path) => load_simulation_config(path)?,
        None => SimulationConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    let reports = if compare {
        compare_modes(&config)?
    } else {
        vec![simulate(&config)?]
    };

    for report in &reports {
        print_report(report);
    }
    if let Some(out) = out {
        match reports.as_slice() {
            [report] => save_report(report, &out)?,
            _ => std::fs::write(&out, serde_json::to_string_pretty(&reports)?)?,
        }
        tracing::info!(path = %out, "report saved");
    }
    Ok(())
}

fn run_demo(producers: usize, patients: usize) -> TriageResult<()> {
    let mut config = TriageConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    let (handle, scheduler_thread) = SchedulerService::spawn(&config)?;

    let producers_done = Arc::new(AtomicBool::new(false));
    let progress = ProgressBar::new(patients as u64);

    let producer_threads = (0..producers)
        .map(|p| {
            let handle = handle.clone();
            let share = patients / producers + usize::from(p < patients % producers);
            thread::spawn(move || -> TriageResult<()> {
                let mut rng = rand::thread_rng();
                for _ in 0..share {
                    let event = ArrivalEvent::new(rng.gen_range(1..=5), rng.gen_range(0..=10), rng.gen_range(5..=60));
                    handle.admit_with_backoff(event, PRODUCER_BACKOFF)?;
                    thread::sleep(Duration::from_millis(rng.gen_range(0..3)));
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    let doctor_threads = (0..DEMO_DOCTORS)
        .map(|_| {
            let handle = handle.clone();
            let producers_done = Arc::clone(&producers_done);
            let progress = progress.clone();
            thread::spawn(move || -> TriageResult<u64> {
                let mut seen = 0;
                loop {
                    match handle.next_patient() {
                        Ok(record) => {
                            seen += 1;
                            progress.inc(1);
                            thread::sleep(Duration::from_micros(u64::from(record.patient.time_to_treat) * 20));
                        }
                        Err(TriageError::EmptyQueue) if producers_done.load(Ordering::Acquire) => break,
                        Err(TriageError::EmptyQueue) => thread::sleep(Duration::from_millis(1)),
                        Err(e) => return Err(e),
                    }
                }
                Ok(seen)
            })
        })
        .collect::<Vec<_>>();

    // Doctors and the scheduler are stopped even when a producer failed.
    let produced = join_all(producer_threads);
    producers_done.store(true, Ordering::Release);
    let served = join_all(doctor_threads);
    progress.finish_and_clear();

    let stopped = handle.shutdown();
    let summary = scheduler_thread
        .join()
        .map_err(|_| TriageError::SchedulerUnavailable)?;
    produced?;
    let per_doctor = served?;
    stopped?;

    println!("{}", serde_json::to_string_pretty(&summary.snapshot)?);
    println!("Patients per doctor: {:?}", per_doctor);
    if let Some(longest) = summary.log.iter().max_by_key(|r| r.waited) {
        println!(
            "Longest wait: {} (severity {}) waited {} ms",
            longest.patient.id, longest.patient.severity, longest.waited
        );
    }
    Ok(())
}

/// Joins every thread, then reports the first failure.
fn join_all<T>(threads: Vec<JoinHandle<TriageResult<T>>>) -> TriageResult<Vec<T>> {
    let results = threads
        .into_iter()
        .map(|t| t.join().unwrap_or_else(|_| Err(TriageError::SchedulerUnavailable)))
        .collect::<Vec<_>>();
    results.into_iter().collect()
}

fn run_topology(mode: QueueMode) -> TriageResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    JsonExport.render(&topology_for(mode), &mut out)
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = std::env::args().collect::<Vec<_>>();
    let program = args.first().map(String::as_str).unwrap_or("desert-triage");

    let command = match parse_args(&args[1.min(args.len())..]) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}");
            print_usage(program);
            std::process::exit(2);
        }
    };

    let result = match command {
        CliCommand::Simulate { config, out, compare } => run_simulation(config, out, compare),
        CliCommand::Demo { producers, patients } => run_demo(producers, patients),
        CliCommand::Topology { mode } => run_topology(mode),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_simulate_with_flags() {
        assert_eq!(
            parse_args(&args(&["simulate", "cfg.json", "--out", "r.json", "--compare"])).unwrap(),
            CliCommand::Simulate {
                config: Some("cfg.json".to_string()),
                out: Some("r.json".to_string()),
                compare: true,
            }
        );
        assert!(parse_args(&args(&["simulate", "--out"])).is_err());
        assert!(parse_args(&args(&["simulate", "a.json", "b.json"])).is_err());
    }

    #[test]
    fn join_all_waits_for_every_thread_before_failing() {
        let finished = Arc::new(AtomicBool::new(false));
        let slow = {
            let finished = Arc::clone(&finished);
            thread::spawn(move || -> TriageResult<u8> {
                thread::sleep(Duration::from_millis(20));
                finished.store(true, Ordering::Release);
                Ok(1)
            })
        };
        let failing = thread::spawn(|| -> TriageResult<u8> { Err(TriageError::QueueFull { capacity: 1 }) });

        assert!(matches!(
            join_all(vec![failing, slow]),
            Err(TriageError::QueueFull { capacity: 1 })
        ));
        assert!(finished.load(Ordering::Acquire));
    }

    #[test]
    fn parses_demo_and_topology() {
        assert_eq!(
            parse_args(&args(&["demo", "--producers", "0", "--patients", "12"])).unwrap(),
            CliCommand::Demo {
                producers: 1,
                patients: 12
            }
        );
        assert_eq!(
            parse_args(&args(&["topology", "single"])).unwrap(),
            CliCommand::Topology {
                mode: QueueMode::Single
            }
        );
        assert!(parse_args(&args(&["topology", "triple"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }
}
