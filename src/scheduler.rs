use std::collections::HashMap;

use serde::Serialize;

use crate::config::{QueueMode, TriageConfig};
use crate::dispatch::{DispatchOutcome, DispatchQueue, DispatchRecord};
use crate::engine::{
    DispatchDecision, MultiQueueEngine, Resolution, SingleQueueEngine, TriageEngine,
};
use crate::error::{TriageError, TriageResult};
use crate::ingress::IngressReceiver;
use crate::model::patient::{ArrivalEvent, ArrivalIngestor, Patient, PatientId, PatientStatus};
use crate::queue::{Escalation, Removal};

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub mode: QueueMode,
    pub admitted: u64,
    pub waiting: usize,
    pub dispatched: usize,
    pub awaiting_doctor: usize,
}

/// Owns every mutable piece of triage state. All mutation goes through
/// `&mut self`, so selecting and dispatching a patient can never interleave
/// with an arrival.
pub struct TriageScheduler {
    mode: QueueMode,
    engine: Box<dyn TriageEngine>,
    ingestor: ArrivalIngestor,
    dispatch: DispatchQueue,
    roster: HashMap<PatientId, Patient>,
}

impl TriageScheduler {
    pub fn new(config: &TriageConfig) -> TriageResult<TriageScheduler> {
        config.validate()?;
        let engine: Box<dyn TriageEngine> = match config.mode {
            QueueMode::Single => Box::new(SingleQueueEngine::new()),
            QueueMode::Multi => Box::new(MultiQueueEngine::new(config.consensus_weights)),
        };
        Ok(TriageScheduler {
            mode: config.mode,
            engine,
            ingestor: ArrivalIngestor::new(),
            dispatch: DispatchQueue::new(config.score_weights),
            roster: HashMap::new(),
        })
    }

    pub fn admit(&mut self, event: &ArrivalEvent, now: u64) -> TriageResult<Patient> {
        let patient = self.ingestor.ingest(event, now)?;
        self.engine.admit(&patient);
        self.roster.insert(patient.id, patient.clone());
        tracing::debug!(
            patient = %patient.id,
            severity = patient.severity,
            arrived_at = patient.arrived_at,
            "patient admitted"
        );
        Ok(patient)
    }

    /// Applies every arrival waiting in the ingress channel, one at a time.
    pub fn drain_ingress(&mut self, ingress: &IngressReceiver, now: u64) -> usize {
        let mut admitted = 0;
        for event in ingress.drain() {
            match self.admit(&event, now) {
                Ok(_) => admitted += 1,
                Err(e) => tracing::warn!(error = %e, "arrival dropped"),
            }
        }
        admitted
    }

    /// Who would be seen next. Nothing is removed.
    pub fn select_next(&self) -> TriageResult<DispatchDecision> {
        self.engine.select_next()
    }

    /// Removes the patient from every queue and hands them to the doctors.
    /// Dispatching someone who is no longer waiting is a no-op.
    pub fn dispatch(&mut self, id: PatientId, now: u64) -> TriageResult<DispatchOutcome> {
        if self.dispatch.contains(id) {
            tracing::debug!(patient = %id, "already dispatched");
            return Ok(DispatchOutcome::NotFound);
        }
        let patient = match self.engine.remove(id) {
            Removal::Removed(patient) => patient,
            Removal::NotFound => {
                tracing::debug!(patient = %id, "not waiting, nothing to dispatch");
                return Ok(DispatchOutcome::NotFound);
            }
        };
        let decision = DispatchDecision {
            patient,
            nominated_by: Vec::new(),
            resolution: Resolution::Manual,
            trace: Vec::new(),
        };
        self.commit(&decision, now).map(DispatchOutcome::Dispatched)
    }

    /// Selects the next patient and dispatches them in one step.
    pub fn select_and_dispatch(&mut self, now: u64) -> TriageResult<DispatchRecord> {
        let decision = self.engine.select_next()?;
        let id = decision.patient.id;
        if let Removal::NotFound = self.engine.remove(id) {
            return Err(TriageError::AlreadyDispatched { id });
        }
        self.commit(&decision, now)
    }

    fn commit(&mut self, decision: &DispatchDecision, now: u64) -> TriageResult<DispatchRecord> {
        let record = self.dispatch.accept(decision, now)?;
        if let Some(patient) = self.roster.get_mut(&record.patient.id) {
            patient.status = PatientStatus::Dispatched;
        }
        tracing::info!(
            patient = %record.patient.id,
            severity = record.patient.severity,
            waited = record.waited,
            resolution = ?record.resolution,
            "patient dispatched"
        );
        Ok(record)
    }

    pub fn escalate(&mut self, id: PatientId, new_severity: u32) -> TriageResult<Escalation> {
        let outcome = self.engine.escalate(id, new_severity)?;
        if outcome == Escalation::Repositioned {
            if let Some(patient) = self.roster.get_mut(&id) {
                patient.severity = new_severity;
            }
            tracing::info!(patient = %id, severity = new_severity, "severity escalated");
        }
        Ok(outcome)
    }

    pub fn next_for_doctor(&mut self) -> Option<DispatchRecord> {
        self.dispatch.next_for_doctor()
    }

    /// Patient for a doctor who just became free. Patients already handed to
    /// the doctor queue go first; otherwise a new one is selected.
    pub fn next_patient(&mut self, now: u64) -> TriageResult<DispatchRecord> {
        if let Some(record) = self.dispatch.next_for_doctor() {
            return Ok(record);
        }
        self.select_and_dispatch(now)?;
        self.dispatch.next_for_doctor().ok_or(TriageError::EmptyQueue)
    }

    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.roster.get(&id)
    }

    pub fn waiting(&self) -> usize {
        self.engine.len()
    }

    pub fn log(&self) -> &[DispatchRecord] {
        self.dispatch.log()
    }

    pub fn into_log(self) -> Vec<DispatchRecord> {
        self.dispatch.into_log()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            mode: self.mode,
            admitted: self.ingestor.admitted(),
            waiting: self.engine.len(),
            dispatched: self.dispatch.log().len(),
            awaiting_doctor: self.dispatch.pending(),
        }
    }
}
