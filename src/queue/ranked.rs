use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TriageError, TriageResult};
use crate::model::patient::{Patient, PatientId, MAX_SEVERITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankPolicy {
    /// Highest severity first, earliest arrival on ties.
    Severity,
    /// First come, first served.
    Fcfs,
    /// Shortest time to treat first, earliest arrival on ties.
    ShortestJob,
}

/// Ordering key of an entry. Smaller keys are closer to the head. The id is
/// part of the key, so two entries never compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RankKey {
    primary: u64,
    arrived_at: u64,
    id: PatientId,
}

impl RankKey {
    pub fn for_patient(policy: RankPolicy, patient: &Patient) -> RankKey {
        let primary = match policy {
            RankPolicy::Severity => u64::from(u32::MAX - patient.severity),
            RankPolicy::Fcfs => 0,
            RankPolicy::ShortestJob => u64::from(patient.time_to_treat),
        };
        RankKey {
            primary,
            arrived_at: patient.arrived_at,
            id: patient.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    Removed(Arc<Patient>),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Repositioned,
    Unchanged,
    NotFound,
}

/// Priority structure over waiting patients. Insert, remove and reposition
/// are O(log n); the head is always the smallest key.
#[derive(Debug)]
pub struct RankedQueue {
    policy: RankPolicy,
    order: BTreeMap<RankKey, Arc<Patient>>,
    keys: HashMap<PatientId, RankKey>,
}

impl RankedQueue {
    pub fn new(policy: RankPolicy) -> RankedQueue {
        RankedQueue {
            policy,
            order: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    /// The single hybrid queue: severity first, then arrival time.
    pub fn hybrid() -> RankedQueue {
        RankedQueue::new(RankPolicy::Severity)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: PatientId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn get(&self, id: PatientId) -> Option<&Arc<Patient>> {
        self.keys.get(&id).and_then(|key| self.order.get(key))
    }

    pub fn enqueue(&mut self, patient: &Patient) {
        self.insert(Arc::new(patient.clone()));
    }

    /// Inserts a shared patient. An entry already queued under the same id is
    /// replaced.
    pub fn insert(&mut self, patient: Arc<Patient>) {
        let key = RankKey::for_patient(self.policy, &patient);
        if let Some(old) = self.keys.insert(patient.id, key) {
            self.order.remove(&old);
        }
        self.order.insert(key, patient);
    }

    pub fn peek(&self) -> TriageResult<Arc<Patient>> {
        self.order
            .values()
            .next()
            .cloned()
            .ok_or(TriageError::EmptyQueue)
    }

    pub fn dequeue(&mut self) -> TriageResult<Arc<Patient>> {
        let (_, patient) = self.order.pop_first().ok_or(TriageError::EmptyQueue)?;
        self.keys.remove(&patient.id);
        Ok(patient)
    }

    pub fn remove(&mut self, id: PatientId) -> Removal {
        match self.keys.remove(&id) {
            Some(key) => match self.order.remove(&key) {
                Some(patient) => Removal::Removed(patient),
                None => Removal::NotFound,
            },
            None => Removal::NotFound,
        }
    }

    /// Raises the severity of a waiting patient and moves its entry
    /// accordingly. Severity never goes down.
    pub fn update_priority(&mut self, id: PatientId, new_severity: u32) -> TriageResult<Escalation> {
        let Some(current) = self.get(id) else {
            return Ok(Escalation::NotFound);
        };
        check_escalation(current, new_severity)?;
        if current.severity == new_severity {
            return Ok(Escalation::Unchanged);
        }

        let escalated = Arc::new(current.escalated(new_severity));
        self.insert(escalated);
        Ok(Escalation::Repositioned)
    }

    /// 0-based position of the patient, counted from the head.
    pub fn rank_of(&self, id: PatientId) -> Option<usize> {
        let key = self.keys.get(&id)?;
        Some(self.order.range(..key).count())
    }
}

/// Re-triage may only raise severity, and never past the top of the scale.
pub(crate) fn check_escalation(current: &Patient, requested: u32) -> TriageResult<()> {
    if requested < current.severity || requested > MAX_SEVERITY {
        return Err(TriageError::EscalationRejected {
            id: current.id,
            current: current.severity,
            requested,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn drain(queue: &mut RankedQueue) -> Vec<Arc<Patient>> {
        let mut out = Vec::new();
        while let Ok(patient) = queue.dequeue() {
            out.push(patient);
        }
        out
    }

    #[test]
    fn hybrid_order_breaks_severity_ties_by_arrival() {
        let mut queue = RankedQueue::hybrid();
        let a = Patient::new(0, 1, 9, 10);
        let b = Patient::new(1, 0, 9, 10);
        let c = Patient::new(2, 2, 5, 10);
        queue.enqueue(&a);
        queue.enqueue(&b);
        queue.enqueue(&c);

        let order = drain(&mut queue)
            .iter()
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![b.id, a.id, c.id]);
    }

    #[test]
    fn empty_queue_signals_empty() {
        let mut queue = RankedQueue::hybrid();
        assert!(matches!(queue.peek(), Err(TriageError::EmptyQueue)));
        assert!(matches!(queue.dequeue(), Err(TriageError::EmptyQueue)));
    }

    #[test]
    fn random_enqueues_dequeue_in_priority_order() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..20 {
            let mut queue = RankedQueue::hybrid();
            for id in 0..200 {
                let patient = Patient::new(id, rng.gen_range(0..50), rng.gen_range(1..10), 5);
                queue.enqueue(&patient);
            }
            let drained = drain(&mut queue);
            assert_eq!(drained.len(), 200);
            for pair in drained.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                assert!(prev.severity >= next.severity);
                if prev.severity == next.severity {
                    assert!(prev.arrived_at <= next.arrived_at);
                }
            }
        }
    }

    #[test]
    fn fcfs_and_shortest_job_orders() {
        let patients = [
            Patient::new(0, 5, 90, 30),
            Patient::new(1, 1, 10, 30),
            Patient::new(2, 3, 50, 5),
        ];
        let mut fcfs = RankedQueue::new(RankPolicy::Fcfs);
        let mut sjf = RankedQueue::new(RankPolicy::ShortestJob);
        for p in &patients {
            fcfs.enqueue(p);
            sjf.enqueue(p);
        }

        let ids = |q: &mut RankedQueue| drain(q).iter().map(|p| p.id.0).collect::<Vec<_>>();
        assert_eq!(ids(&mut fcfs), vec![1, 2, 0]);
        assert_eq!(ids(&mut sjf), vec![2, 1, 0]);
    }

    #[test]
    fn update_priority_moves_entry_to_front() {
        let mut queue = RankedQueue::hybrid();
        queue.enqueue(&Patient::new(0, 0, 80, 10));
        queue.enqueue(&Patient::new(1, 1, 40, 10));
        assert_eq!(queue.rank_of(PatientId(1)), Some(1));

        let outcome = queue.update_priority(PatientId(1), 100).unwrap();
        assert_eq!(outcome, Escalation::Repositioned);
        assert_eq!(queue.rank_of(PatientId(1)), Some(0));
        assert_eq!(queue.len(), 2);

        let head = queue.peek().unwrap();
        assert_eq!(head.id, PatientId(1));
        assert_eq!(head.severity, 100);
        assert_eq!(head.arrived_at, 1);
    }

    #[test]
    fn update_priority_refuses_to_lower_severity() {
        let mut queue = RankedQueue::hybrid();
        queue.enqueue(&Patient::new(0, 0, 80, 10));

        assert!(matches!(
            queue.update_priority(PatientId(0), 20),
            Err(TriageError::EscalationRejected { current: 80, requested: 20, .. })
        ));
        assert_eq!(queue.update_priority(PatientId(0), 80).unwrap(), Escalation::Unchanged);
        assert_eq!(queue.update_priority(PatientId(9), 99).unwrap(), Escalation::NotFound);
        assert_eq!(queue.peek().unwrap().severity, 80);
    }

    #[test]
    fn update_priority_is_capped_at_max_severity() {
        let mut queue = RankedQueue::hybrid();
        queue.enqueue(&Patient::new(0, 0, 80, 10));

        assert!(matches!(
            queue.update_priority(PatientId(0), MAX_SEVERITY + 1),
            Err(TriageError::EscalationRejected { current: 80, .. })
        ));
        assert_eq!(queue.peek().unwrap().severity, 80);
        assert_eq!(
            queue.update_priority(PatientId(0), MAX_SEVERITY).unwrap(),
            Escalation::Repositioned
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let mut queue = RankedQueue::hybrid();
        queue.enqueue(&Patient::new(0, 0, 80, 10));

        assert!(matches!(queue.remove(PatientId(0)), Removal::Removed(_)));
        assert_eq!(queue.remove(PatientId(0)), Removal::NotFound);
        assert!(queue.is_empty());
        assert!(!queue.contains(PatientId(0)));
    }
}
