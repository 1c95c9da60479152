use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{TriageError, TriageResult};
use crate::model::patient::{Patient, PatientId};
use crate::queue::ranked::check_escalation;
use crate::queue::{Escalation, RankPolicy, RankedQueue, Removal};

use super::{CandidateScore, DispatchDecision, QueueLevel, Resolution, TriageEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusWeights {
    pub severity: u32,
    pub fcfs: u32,
    pub shortest_job: u32,
}

impl Default for ConsensusWeights {
    fn default() -> Self {
        ConsensusWeights {
            severity: 1,
            fcfs: 1,
            shortest_job: 1,
        }
    }
}

impl ConsensusWeights {
    pub fn weight(&self, level: QueueLevel) -> u32 {
        match level {
            QueueLevel::Severity | QueueLevel::Hybrid => self.severity,
            QueueLevel::Fcfs => self.fcfs,
            QueueLevel::ShortestJob => self.shortest_job,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.severity == 0 && self.fcfs == 0 && self.shortest_job == 0
    }
}

#[derive(Debug)]
struct Level {
    level: QueueLevel,
    queue: RankedQueue,
}

/// DeSERT multi-queue: three views over the same waiting patients, reconciled
/// by a weighted-rank consensus.
///
/// Every queue nominates its head. A unanimous nomination wins outright.
/// Otherwise each nominee is scored with `sum(weight * rank)` over all queues
/// and the lowest score wins; ties go to the earliest arrival, then the lowest
/// id.
#[derive(Debug)]
pub struct MultiQueueEngine {
    levels: [Level; 3],
    weights: ConsensusWeights,
}

impl MultiQueueEngine {
    pub fn new(weights: ConsensusWeights) -> MultiQueueEngine {
        MultiQueueEngine {
            levels: [
                Level {
                    level: QueueLevel::Severity,
                    queue: RankedQueue::new(RankPolicy::Severity),
                },
                Level {
                    level: QueueLevel::Fcfs,
                    queue: RankedQueue::new(RankPolicy::Fcfs),
                },
                Level {
                    level: QueueLevel::ShortestJob,
                    queue: RankedQueue::new(RankPolicy::ShortestJob),
                },
            ],
            weights,
        }
    }

    pub fn rank_of(&self, level: QueueLevel, id: PatientId) -> Option<usize> {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .and_then(|l| l.queue.rank_of(id))
    }

    fn nominees(&self) -> TriageResult<Vec<(QueueLevel, Arc<Patient>)>> {
        let mut nominees = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            match level.queue.peek() {
                Ok(patient) => nominees.push((level.level, patient)),
                Err(TriageError::EmptyQueue) => {
                    tracing::trace!(queue = ?level.level, "no candidate this cycle");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(nominees)
    }

    fn score(&self, patient: &Patient) -> CandidateScore {
        let ranks = self
            .levels
            .iter()
            .filter_map(|l| l.queue.rank_of(patient.id).map(|rank| (l.level, rank)))
            .collect::<Vec<_>>();
        let weighted_sum = ranks
            .iter()
            .map(|(level, rank)| u64::from(self.weights.weight(*level)) * *rank as u64)
            .sum();
        CandidateScore {
            patient: patient.id,
            ranks,
            weighted_sum,
        }
    }
}

impl TriageEngine for MultiQueueEngine {
    fn admit(&mut self, patient: &Patient) {
        let shared = Arc::new(patient.clone());
        for level in self.levels.iter_mut() {
            level.queue.insert(Arc::clone(&shared));
        }
    }

    fn select_next(&self) -> TriageResult<DispatchDecision> {
        let nominees = self.nominees()?;
        let candidates = nominees
            .iter()
            .map(|(_, patient)| Arc::clone(patient))
            .unique_by(|patient| patient.id)
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            return Err(TriageError::EmptyQueue);
        }

        if candidates.len() == 1 && nominees.len() == self.levels.len() {
            let patient = Arc::clone(&candidates[0]);
            return Ok(DispatchDecision {
                trace: vec![self.score(&patient)],
                nominated_by: nominees.iter().map(|(level, _)| *level).collect(),
                resolution: Resolution::Unanimous,
                patient,
            });
        }

        let mut scored = candidates
            .into_iter()
            .map(|patient| (self.score(&patient), patient))
            .collect::<Vec<_>>();
        scored.sort_by_key(|(score, patient)| (score.weighted_sum, patient.arrived_at, patient.id));

        let resolution = match scored.get(1) {
            Some((runner_up, other)) => {
                let (best, winner) = &scored[0];
                if best.weighted_sum != runner_up.weighted_sum {
                    Resolution::WeightedRank
                } else if winner.arrived_at != other.arrived_at {
                    Resolution::ArrivalTieBreak
                } else {
                    Resolution::IdTieBreak
                }
            }
            None => Resolution::WeightedRank,
        };

        let patient = Arc::clone(&scored[0].1);
        let nominated_by = nominees
            .iter()
            .filter(|(_, nominee)| nominee.id == patient.id)
            .map(|(level, _)| *level)
            .collect();
        let trace = scored.into_iter().map(|(score, _)| score).collect();

        Ok(DispatchDecision {
            patient,
            nominated_by,
            resolution,
            trace,
        })
    }

    fn remove(&mut self, id: PatientId) -> Removal {
        let mut removal = Removal::NotFound;
        for level in self.levels.iter_mut() {
            if let Removal::Removed(patient) = level.queue.remove(id) {
                removal = Removal::Removed(patient);
            }
        }
        removal
    }

    fn escalate(&mut self, id: PatientId, new_severity: u32) -> TriageResult<Escalation> {
        let Some(current) = self.get(id) else {
            return Ok(Escalation::NotFound);
        };
        check_escalation(&current, new_severity)?;
        if current.severity == new_severity {
            return Ok(Escalation::Unchanged);
        }

        let escalated = Arc::new(current.escalated(new_severity));
        for level in self.levels.iter_mut() {
            level.queue.insert(Arc::clone(&escalated));
        }
        Ok(Escalation::Repositioned)
    }

    fn get(&self, id: PatientId) -> Option<Arc<Patient>> {
        self.levels[0].queue.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.levels[0].queue.len()
    }
}
