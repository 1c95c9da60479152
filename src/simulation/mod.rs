//! Discrete-time emergency department: patients arrive, the scheduler
//! triages them, doctors pull the next patient whenever they are free.
//! One tick is one minute. Runs are reproducible for a given seed.

pub mod report;

use std::thread;

use crossbeam_channel::unbounded;
use indicatif::{MultiProgress, ProgressBar};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::{ArrivalPattern, QueueMode, SimulationConfig};
use crate::error::{TriageError, TriageResult};
use crate::model::doctor::DoctorFactory;
use crate::model::patient::{ArrivalEvent, MAX_ACUITY, MAX_PAIN_SCORE, MIN_ACUITY};
use crate::scheduler::TriageScheduler;

pub use report::SimulationReport;

const MIN_TIME_TO_TREAT: u32 = 5;
const MAX_TIME_TO_TREAT: u32 = 60;

pub fn simulate(config: &SimulationConfig) -> TriageResult<SimulationReport> {
    let progress = if config.show_progress {
        ProgressBar::new(config.arrival_ticks)
    } else {
        ProgressBar::hidden()
    };
    simulate_with_progress(config, progress)
}

pub fn simulate_with_progress(
    config: &SimulationConfig,
    progress: ProgressBar,
) -> TriageResult<SimulationReport> {
    config.validate()?;
    let mut scheduler = TriageScheduler::new(&config.triage)?;
    let mut doctors = DoctorFactory::generate_vec_doctors(config.nbr_doctors, config.burnout_rate);
    let mut rng = StdRng::seed_from_u64(config.seed);

    tracing::info!(
        mode = ?config.triage.mode,
        pattern = ?config.pattern,
        doctors = config.nbr_doctors,
        seed = config.seed,
        "simulation started"
    );

    let mut tick = 0;
    loop {
        if tick < config.arrival_ticks {
            for event in generate_arrivals(&mut rng, config) {
                scheduler.admit(&event, tick)?;
            }
            progress.inc(1);
        }

        for doctor in doctors.iter_mut().filter(|d| d.is_free(tick)) {
            match scheduler.next_patient(tick) {
                Ok(record) => {
                    doctor.treat(&record.patient, tick);
                }
                Err(TriageError::EmptyQueue) => break,
                Err(e) => return Err(e),
            }
        }

        if tick + 1 >= config.arrival_ticks && scheduler.waiting() == 0 {
            break;
        }
        tick += 1;
        if tick >= config.max_ticks {
            tracing::warn!(
                waiting = scheduler.waiting(),
                max_ticks = config.max_ticks,
                "tick limit reached with patients still waiting"
            );
            break;
        }
    }
    progress.finish_and_clear();

    let finished_at = doctors.iter().map(|d| d.busy_until()).max().unwrap_or(tick).max(tick);
    let report = SimulationReport::new(config, &scheduler, doctors, finished_at);
    tracing::info!(
        dispatched = report.dispatched,
        still_waiting = report.still_waiting,
        mean_wait = report.mean_wait,
        max_wait = report.max_wait,
        "simulation finished"
    );
    Ok(report)
}

/// Runs the same scenario once per queue mode, each on its own thread.
pub fn compare_modes(config: &SimulationConfig) -> TriageResult<Vec<SimulationReport>> {
    let bars = MultiProgress::new();
    let (sender, receiver) = unbounded();

    let threads = [QueueMode::Single, QueueMode::Multi]
        .into_iter()
        .map(|mode| {
            let mut config = config.clone();
            config.triage.mode = mode;
            let progress = if config.show_progress {
                bars.add(ProgressBar::new(config.arrival_ticks))
            } else {
                ProgressBar::hidden()
            };
            let sender = sender.clone();
            thread::spawn(move || {
                // The receiver outlives every worker.
                let _ = sender.send(simulate_with_progress(&config, progress));
            })
        })
        .collect::<Vec<_>>();
    drop(sender);

    for t in threads {
        t.join().map_err(|_| TriageError::SchedulerUnavailable)?;
    }

    let mut reports = receiver.iter().collect::<TriageResult<Vec<_>>>()?;
    reports.sort_by_key(|r| r.mode == QueueMode::Multi);
    Ok(reports)
}

fn generate_arrivals(rng: &mut StdRng, config: &SimulationConfig) -> Vec<ArrivalEvent> {
    let mut arrivals = Vec::new();
    if rng.gen_bool(config.arrival_probability) {
        arrivals.push(ArrivalEvent::new(
            rng.gen_range(MIN_ACUITY..=MAX_ACUITY),
            rng.gen_range(0..=MAX_PAIN_SCORE),
            rng.gen_range(MIN_TIME_TO_TREAT..=MAX_TIME_TO_TREAT),
        ));
    }
    if config.pattern == ArrivalPattern::Adversarial {
        arrivals.push(ArrivalEvent::new(
            MIN_ACUITY,
            MAX_PAIN_SCORE,
            rng.gen_range(MIN_TIME_TO_TREAT..=MAX_TIME_TO_TREAT),
        ));
    }
    arrivals
}
