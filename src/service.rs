//! Scheduler thread. Producers push arrivals through the bounded ingress
//! channel; doctors and operators talk to the thread with request/reply
//! commands. Only this thread ever touches the queues.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};

use crate::config::TriageConfig;
use crate::dispatch::{DispatchOutcome, DispatchRecord};
use crate::error::{TriageError, TriageResult};
use crate::ingress::{self, IngressReceiver, IngressSender};
use crate::model::patient::{ArrivalEvent, PatientId};
use crate::queue::Escalation;
use crate::scheduler::{QueueSnapshot, TriageScheduler};

enum Command {
    NextPatient {
        reply: Sender<TriageResult<DispatchRecord>>,
    },
    Dispatch {
        id: PatientId,
        reply: Sender<TriageResult<DispatchOutcome>>,
    },
    Escalate {
        id: PatientId,
        severity: u32,
        reply: Sender<TriageResult<Escalation>>,
    },
    Snapshot {
        reply: Sender<QueueSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    ingress: IngressSender,
    commands: Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::NextPatient { .. } => write!(f, "NextPatient"),
            Command::Dispatch { id, .. } => write!(f, "Dispatch({id})"),
            Command::Escalate { id, severity, .. } => write!(f, "Escalate({id}, {severity})"),
            Command::Snapshot { .. } => write!(f, "Snapshot"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl SchedulerHandle {
    pub fn admit(&self, event: ArrivalEvent) -> TriageResult<()> {
        self.ingress.submit(event)
    }

    /// Like `admit`, but sleeps for `backoff` and tries again while the
    /// ingress rejects with `QueueFull`.
    pub fn admit_with_backoff(&self, event: ArrivalEvent, backoff: Duration) -> TriageResult<()> {
        loop {
            match self.ingress.submit(event.clone()) {
                Err(TriageError::QueueFull { capacity }) => {
                    tracing::debug!(capacity, "ingress full, retrying");
                    thread::sleep(backoff);
                }
                other => return other,
            }
        }
    }

    /// Next patient for a free doctor. Never waits for arrivals: an empty
    /// scheduler answers `TriageError::EmptyQueue`.
    pub fn next_patient(&self) -> TriageResult<DispatchRecord> {
        self.request(|reply| Command::NextPatient { reply })?
    }

    pub fn dispatch(&self, id: PatientId) -> TriageResult<DispatchOutcome> {
        self.request(|reply| Command::Dispatch { id, reply })?
    }

    pub fn escalate(&self, id: PatientId, severity: u32) -> TriageResult<Escalation> {
        self.request(|reply| Command::Escalate { id, severity, reply })?
    }

    pub fn snapshot(&self) -> TriageResult<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply })
    }

    pub fn shutdown(&self) -> TriageResult<()> {
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| TriageError::SchedulerUnavailable)
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> TriageResult<T> {
        let (reply, response) = bounded(1);
        self.commands
            .send(command(reply))
            .map_err(|_| TriageError::SchedulerUnavailable)?;
        response.recv().map_err(|_| TriageError::SchedulerUnavailable)
    }
}

/// What the scheduler thread hands back once it stops.
#[derive(Debug)]
pub struct ServiceSummary {
    pub snapshot: QueueSnapshot,
    pub log: Vec<DispatchRecord>,
}

pub struct SchedulerService;

impl SchedulerService {
    /// Starts the scheduler thread. Joining the returned handle yields the
    /// final counts and the dispatch log once the service has been shut down.
    pub fn spawn(config: &TriageConfig) -> TriageResult<(SchedulerHandle, JoinHandle<ServiceSummary>)> {
        let scheduler = TriageScheduler::new(config)?;
        let (ingress_tx, ingress_rx) = ingress::channel(config.ingress_capacity, config.overflow);
        let (command_tx, command_rx) = unbounded();

        tracing::info!(
            mode = ?config.mode,
            capacity = config.ingress_capacity,
            overflow = ?config.overflow,
            "scheduler starting"
        );
        let thread = thread::spawn(move || run(scheduler, ingress_rx, command_rx));

        Ok((
            SchedulerHandle {
                ingress: ingress_tx,
                commands: command_tx,
            },
            thread,
        ))
    }
}

fn run(
    mut scheduler: TriageScheduler,
    ingress: IngressReceiver,
    commands: Receiver<Command>,
) -> ServiceSummary {
    let started = Instant::now();
    let now = || started.elapsed().as_millis() as u64;
    let closed = never::<ArrivalEvent>();
    let mut ingress_open = true;

    loop {
        let arrivals = if ingress_open { ingress.inner() } else { &closed };
        let keep_running = select! {
            recv(arrivals) -> event => {
                match event {
                    Ok(event) => {
                        if let Err(e) = scheduler.admit(&event, now()) {
                            tracing::warn!(error = %e, "arrival dropped");
                        }
                    }
                    Err(_) => ingress_open = false,
                }
                true
            },
            recv(commands) -> command => match command {
                Ok(command) => {
                    scheduler.drain_ingress(&ingress, now());
                    handle_command(&mut scheduler, command, now())
                }
                Err(_) => false,
            },
        };
        if !keep_running {
            break;
        }
    }

    // Arrivals accepted before the stop still count as admitted.
    scheduler.drain_ingress(&ingress, now());
    let snapshot = scheduler.snapshot();
    tracing::info!(
        admitted = snapshot.admitted,
        dispatched = snapshot.dispatched,
        waiting = snapshot.waiting,
        "scheduler stopped"
    );
    ServiceSummary {
        snapshot,
        log: scheduler.into_log(),
    }
}

/// Serves one command. Returns `false` once the loop should stop.
fn handle_command(scheduler: &mut TriageScheduler, command: Command, now: u64) -> bool {
    tracing::trace!(?command, "command received");
    // Reply send failures only mean the requester is gone.
    match command {
        Command::NextPatient { reply } => {
            let _ = reply.send(scheduler.next_patient(now));
        }
        Command::Dispatch { id, reply } => {
            let _ = reply.send(scheduler.dispatch(id, now));
        }
        Command::Escalate { id, severity, reply } => {
            let _ = reply.send(scheduler.escalate(id, severity));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(scheduler.snapshot());
        }
        Command::Shutdown => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::{OverflowPolicy, QueueMode};

    #[test]
    fn concurrent_producers_are_all_dispatched_once() {
        let mut config = TriageConfig::with_mode(QueueMode::Multi);
        config.ingress_capacity = 8;
        config.overflow = OverflowPolicy::Block;
        let (handle, thread) = SchedulerService::spawn(&config).unwrap();

        let producers = (0..4u8)
            .map(|p| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for i in 0..25u8 {
                        handle
                            .admit(ArrivalEvent::new(1 + (i + p) % 5, i % 11, 5 + i as u32))
                            .unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut seen = HashSet::new();
        loop {
            match handle.next_patient() {
                Ok(record) => assert!(seen.insert(record.patient.id)),
                Err(TriageError::EmptyQueue) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(seen.len(), 100);

        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.admitted, 100);
        assert_eq!(snapshot.waiting, 0);

        handle.shutdown().unwrap();
        let summary = thread.join().unwrap();
        assert_eq!(summary.log.len(), 100);
        assert_eq!(summary.snapshot.dispatched, 100);
    }

    #[test]
    fn arrivals_submitted_before_a_request_are_visible() {
        let (handle, thread) = SchedulerService::spawn(&TriageConfig::with_mode(QueueMode::Single)).unwrap();
        handle.admit(ArrivalEvent::new(4, 0, 10)).unwrap();
        handle.admit(ArrivalEvent::new(1, 9, 10)).unwrap();

        let first = handle.next_patient().unwrap();
        assert_eq!(first.patient.id, PatientId(1));

        assert_eq!(handle.escalate(PatientId(0), 140).unwrap(), Escalation::Repositioned);
        assert!(matches!(
            handle.escalate(PatientId(0), u32::MAX),
            Err(TriageError::EscalationRejected { current: 140, .. })
        ));
        assert!(matches!(
            handle.dispatch(PatientId(1)).unwrap(),
            DispatchOutcome::NotFound
        ));

        handle.shutdown().unwrap();
        thread.join().unwrap();
        assert!(matches!(handle.next_patient(), Err(TriageError::SchedulerUnavailable)));
        assert!(matches!(
            handle.admit(ArrivalEvent::new(3, 0, 10)),
            Err(TriageError::SchedulerUnavailable)
        ));
    }

    #[test]
    fn backoff_rides_out_a_full_ingress() {
        let mut config = TriageConfig::with_mode(QueueMode::Single);
        config.ingress_capacity = 1;
        config.overflow = OverflowPolicy::Reject;
        let (handle, thread) = SchedulerService::spawn(&config).unwrap();

        let producer = {
            let handle = handle.clone();
            thread::spawn(move || -> TriageResult<()> {
                for pain in 0..30u8 {
                    handle.admit_with_backoff(ArrivalEvent::new(3, pain % 11, 10), Duration::from_millis(1))?;
                }
                Ok(())
            })
        };

        let mut seen = HashSet::new();
        while seen.len() < 30 {
            match handle.next_patient() {
                Ok(record) => assert!(seen.insert(record.patient.id)),
                Err(TriageError::EmptyQueue) => thread::yield_now(),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        producer.join().unwrap().unwrap();

        handle.shutdown().unwrap();
        assert_eq!(thread.join().unwrap().snapshot.admitted, 30);
    }

    #[test]
    fn accepted_arrivals_are_admitted_before_stopping() {
        let (handle, thread) = SchedulerService::spawn(&TriageConfig::with_mode(QueueMode::Multi)).unwrap();
        for pain in 0..5 {
            handle.admit(ArrivalEvent::new(3, pain, 10)).unwrap();
        }
        handle.shutdown().unwrap();
        drop(handle);

        let summary = thread.join().unwrap();
        assert_eq!(summary.snapshot.admitted, 5);
        assert_eq!(summary.snapshot.waiting, 5);
        assert!(summary.log.is_empty());
    }

    #[test]
    fn dropping_every_handle_stops_the_scheduler() {
        let (handle, thread) = SchedulerService::spawn(&TriageConfig::with_mode(QueueMode::Single)).unwrap();
        handle.admit(ArrivalEvent::new(2, 3, 10)).unwrap();
        handle.admit(ArrivalEvent::new(5, 0, 10)).unwrap();
        drop(handle);

        let summary = thread.join().unwrap();
        assert_eq!(summary.snapshot.admitted, 2);
        assert_eq!(summary.snapshot.waiting, 2);
    }
}
