use std::sync::Arc;

use crate::error::TriageResult;
use crate::model::patient::{Patient, PatientId};
use crate::queue::{Escalation, RankedQueue, Removal};

use super::{DispatchDecision, QueueLevel, Resolution, TriageEngine};

/// DeSERT hybrid single queue.
#[derive(Debug)]
pub struct SingleQueueEngine {
    queue: RankedQueue,
}

impl SingleQueueEngine {
    pub fn new() -> SingleQueueEngine {
        SingleQueueEngine {
            queue: RankedQueue::hybrid(),
        }
    }
}

impl Default for SingleQueueEngine {
    fn default() -> Self {
        SingleQueueEngine::new()
    }
}

impl TriageEngine for SingleQueueEngine {
    fn admit(&mut self, patient: &Patient) {
        self.queue.enqueue(patient);
    }

    fn select_next(&self) -> TriageResult<DispatchDecision> {
        Ok(DispatchDecision {
            patient: self.queue.peek()?,
            nominated_by: vec![QueueLevel::Hybrid],
            resolution: Resolution::Head,
            trace: Vec::new(),
        })
    }

    fn remove(&mut self, id: PatientId) -> Removal {
        self.queue.remove(id)
    }

    fn escalate(&mut self, id: PatientId, new_severity: u32) -> TriageResult<Escalation> {
        self.queue.update_priority(id, new_severity)
    }

    fn get(&self, id: PatientId) -> Option<Arc<Patient>> {
        self.queue.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}
