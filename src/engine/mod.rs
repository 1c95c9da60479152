//! Selection engines. Both variants own the waiting patients and answer the
//! same question: who should the next free doctor see?

pub mod multi;
pub mod single;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TriageResult;
use crate::model::patient::{Patient, PatientId};
use crate::queue::{Escalation, Removal};

pub use multi::{ConsensusWeights, MultiQueueEngine};
pub use single::SingleQueueEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLevel {
    Hybrid,
    Severity,
    Fcfs,
    ShortestJob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Head of the only queue.
    Head,
    /// Every queue nominated the same patient.
    Unanimous,
    /// Lowest weighted-rank sum.
    WeightedRank,
    /// Equal sums, earliest arrival won.
    ArrivalTieBreak,
    /// Equal sums and arrival times, lowest id won.
    IdTieBreak,
    /// Dispatched by id, outside of selection.
    Manual,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Head => "head",
            Resolution::Unanimous => "unanimous",
            Resolution::WeightedRank => "weighted_rank",
            Resolution::ArrivalTieBreak => "arrival_tie_break",
            Resolution::IdTieBreak => "id_tie_break",
            Resolution::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub patient: PatientId,
    pub ranks: Vec<(QueueLevel, usize)>,
    pub weighted_sum: u64,
}

#[derive(Debug, Clone)]
pub struct DispatchDecision {
    pub patient: Arc<Patient>,
    pub nominated_by: Vec<QueueLevel>,
    pub resolution: Resolution,
    pub trace: Vec<CandidateScore>,
}

pub trait TriageEngine: Send {
    fn admit(&mut self, patient: &Patient);

    /// Picks the next patient without removing it. Returns
    /// `TriageError::EmptyQueue` when nobody is waiting.
    fn select_next(&self) -> TriageResult<DispatchDecision>;

    /// Removes the patient from every queue the engine owns.
    fn remove(&mut self, id: PatientId) -> Removal;

    fn escalate(&mut self, id: PatientId, new_severity: u32) -> TriageResult<Escalation>;

    fn get(&self, id: PatientId) -> Option<Arc<Patient>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
