use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TriageError, TriageResult};

pub const MIN_ACUITY: u8 = 1;
pub const MAX_ACUITY: u8 = 5;
pub const MAX_PAIN_SCORE: u8 = 10;
/// Severity points per acuity level. Larger than the maximum pain
/// contribution, so a more acute patient always outranks a less acute one.
pub const ACUITY_STEP: u32 = 25;
pub const PAIN_WEIGHT: u32 = 2;
pub const MIN_SEVERITY: u32 = ACUITY_STEP;
pub const MAX_SEVERITY: u32 =
    (MAX_ACUITY as u32 + 1 - MIN_ACUITY as u32) * ACUITY_STEP + MAX_PAIN_SCORE as u32 * PAIN_WEIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub u64);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Waiting,
    Dispatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub arrived_at: u64,
    pub severity: u32,
    pub time_to_treat: u32,
    pub status: PatientStatus,
}

impl Patient {
    pub fn new(id: u64, arrived_at: u64, severity: u32, time_to_treat: u32) -> Patient {
        Patient {
            id: PatientId(id),
            arrived_at,
            severity,
            time_to_treat,
            status: PatientStatus::Waiting,
        }
    }

    /// Copy of this patient with a higher severity. Everything else, arrival
    /// time included, is carried over.
    pub fn escalated(&self, severity: u32) -> Patient {
        Patient {
            severity,
            ..self.clone()
        }
    }

    pub fn time_waited(&self, now: u64) -> u64 {
        now.saturating_sub(self.arrived_at)
    }

    /// Hybrid position score of the patient at instant `now`.
    ///
    /// ```text
    /// severity 50, waited 30, time to treat 18
    /// 50 * 0.5 + 30 * 0.3 + 18 * 0.2 = 37.6
    /// ```
    pub fn position_score(&self, now: u64, weights: &PositionScoreWeights) -> f64 {
        self.severity as f64 * weights.severity
            + self.time_waited(now) as f64 * weights.time_waited
            + self.time_to_treat as f64 * weights.shortest_job
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionScoreWeights {
    pub severity: f64,
    pub time_waited: f64,
    pub shortest_job: f64,
}

impl Default for PositionScoreWeights {
    fn default() -> Self {
        PositionScoreWeights {
            severity: 0.5,
            time_waited: 0.3,
            shortest_job: 0.2,
        }
    }
}

/// Triage inputs of a single arrival, as reported by the intake desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalEvent {
    /// 1 is the most acute, 5 the least.
    pub acuity: u8,
    pub pain_score: u8,
    pub time_to_treat: u32,
    #[serde(default)]
    pub arrived_at: Option<u64>,
}

impl ArrivalEvent {
    pub fn new(acuity: u8, pain_score: u8, time_to_treat: u32) -> ArrivalEvent {
        ArrivalEvent {
            acuity,
            pain_score,
            time_to_treat,
            arrived_at: None,
        }
    }

    pub fn at(mut self, arrived_at: u64) -> ArrivalEvent {
        self.arrived_at = Some(arrived_at);
        self
    }

    pub fn validate(&self) -> TriageResult<()> {
        if !(MIN_ACUITY..=MAX_ACUITY).contains(&self.acuity) {
            return Err(TriageError::InvalidArrival(format!(
                "acuity {} outside {MIN_ACUITY}..={MAX_ACUITY}",
                self.acuity
            )));
        }
        if self.pain_score > MAX_PAIN_SCORE {
            return Err(TriageError::InvalidArrival(format!(
                "pain score {} above {MAX_PAIN_SCORE}",
                self.pain_score
            )));
        }
        if self.time_to_treat == 0 {
            return Err(TriageError::InvalidArrival(
                "time to treat must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn severity_score(&self) -> u32 {
        (MAX_ACUITY as u32 + 1 - self.acuity as u32) * ACUITY_STEP + self.pain_score as u32 * PAIN_WEIGHT
    }
}

/// Turns arrival events into patients: hands out ids and keeps arrival
/// timestamps non-decreasing.
#[derive(Debug, Default)]
pub struct ArrivalIngestor {
    next_id: u64,
    last_arrival: u64,
}

impl ArrivalIngestor {
    pub fn new() -> ArrivalIngestor {
        ArrivalIngestor::default()
    }

    pub fn ingest(&mut self, event: &ArrivalEvent, now: u64) -> TriageResult<Patient> {
        event.validate()?;

        // A late-delivered event never lands before an earlier admission.
        let arrived_at = event.arrived_at.unwrap_or(now).max(self.last_arrival);
        self.last_arrival = arrived_at;

        let patient = Patient::new(
            self.next_id,
            arrived_at,
            event.severity_score(),
            event.time_to_treat,
        );
        self.next_id += 1;
        Ok(patient)
    }

    pub fn admitted(&self) -> u64 {
        self.next_id
    }
}
