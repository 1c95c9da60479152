//! Doctor-facing side of the scheduler: an append-only dispatch log plus the
//! FCFS queue doctors pull from.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::engine::{DispatchDecision, QueueLevel, Resolution};
use crate::error::{TriageError, TriageResult};
use crate::model::patient::{Patient, PatientId, PatientStatus, PositionScoreWeights};

#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub sequence: u64,
    pub patient: Patient,
    pub dispatched_at: u64,
    pub waited: u64,
    pub position_score: f64,
    pub nominated_by: Vec<QueueLevel>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Dispatched(DispatchRecord),
    NotFound,
}

impl DispatchOutcome {
    pub fn record(&self) -> Option<&DispatchRecord> {
        match self {
            DispatchOutcome::Dispatched(record) => Some(record),
            DispatchOutcome::NotFound => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchQueue {
    pending: VecDeque<DispatchRecord>,
    log: Vec<DispatchRecord>,
    dispatched: HashSet<PatientId>,
    score_weights: PositionScoreWeights,
}

impl DispatchQueue {
    pub fn new(score_weights: PositionScoreWeights) -> DispatchQueue {
        DispatchQueue {
            score_weights,
            ..DispatchQueue::default()
        }
    }

    pub fn contains(&self, id: PatientId) -> bool {
        self.dispatched.contains(&id)
    }

    /// Appends the selected patient to the log and to the doctor queue.
    /// A patient already in the log is refused and nothing changes.
    pub fn accept(&mut self, decision: &DispatchDecision, now: u64) -> TriageResult<DispatchRecord> {
        let id = decision.patient.id;
        if self.dispatched.contains(&id) {
            return Err(TriageError::AlreadyDispatched { id });
        }

        let mut patient = decision.patient.as_ref().clone();
        patient.status = PatientStatus::Dispatched;

        let record = DispatchRecord {
            sequence: self.log.len() as u64,
            waited: patient.time_waited(now),
            position_score: patient.position_score(now, &self.score_weights),
            patient,
            dispatched_at: now,
            nominated_by: decision.nominated_by.clone(),
            resolution: decision.resolution,
        };

        self.dispatched.insert(id);
        self.log.push(record.clone());
        self.pending.push_back(record.clone());
        Ok(record)
    }

    /// Next dispatched patient for a free doctor, first come first served.
    pub fn next_for_doctor(&mut self) -> Option<DispatchRecord> {
        self.pending.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn log(&self) -> &[DispatchRecord] {
        &self.log
    }

    pub fn into_log(self) -> Vec<DispatchRecord> {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn decision(patient: Patient) -> DispatchDecision {
        DispatchDecision {
            patient: Arc::new(patient),
            nominated_by: vec![QueueLevel::Hybrid],
            resolution: Resolution::Head,
            trace: Vec::new(),
        }
    }

    #[test]
    fn accepted_patients_reach_doctors_in_order() {
        let mut queue = DispatchQueue::new(PositionScoreWeights::default());
        queue.accept(&decision(Patient::new(3, 0, 80, 10)), 5).unwrap();
        queue.accept(&decision(Patient::new(1, 2, 90, 10)), 6).unwrap();

        let first = queue.next_for_doctor().unwrap();
        assert_eq!(first.patient.id, PatientId(3));
        assert_eq!(first.patient.status, PatientStatus::Dispatched);
        assert_eq!(first.waited, 5);
        assert_eq!(first.sequence, 0);
        assert_eq!(queue.next_for_doctor().unwrap().patient.id, PatientId(1));
        assert!(queue.next_for_doctor().is_none());
        assert_eq!(queue.log().len(), 2);
    }

    #[test]
    fn double_accept_is_refused() {
        let mut queue = DispatchQueue::new(PositionScoreWeights::default());
        let d = decision(Patient::new(3, 0, 80, 10));
        queue.accept(&d, 5).unwrap();

        assert!(matches!(
            queue.accept(&d, 9),
            Err(TriageError::AlreadyDispatched { id: PatientId(3) })
        ));
        assert_eq!(queue.log().len(), 1);
        assert_eq!(queue.pending(), 1);
    }
}
