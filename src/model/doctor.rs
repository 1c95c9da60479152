use serde::Serialize;

use super::patient::Patient;

const MIN_EFFICIENCY: f32 = 0.25;

#[derive(Debug, Clone, Serialize)]
pub struct Doctor {
    pub id: u64,
    pub interaction_time: u64,
    pub efficiency: f32,
    pub burnout_rate: f32,
    pub patients_seen: u32,
    #[serde(skip)]
    busy_until: u64,
}

impl Doctor {
    pub fn new(id: u64, burnout_rate: f32) -> Self {
        Doctor {
            id,
            interaction_time: 0,
            efficiency: 1.0,
            burnout_rate,
            patients_seen: 0,
            busy_until: 0,
        }
    }

    pub fn is_free(&self, now: u64) -> bool {
        self.busy_until <= now
    }

    pub fn busy_until(&self) -> u64 {
        self.busy_until
    }

    /// Starts treating `patient` at `now` and returns the tick the doctor is
    /// free again. A tired doctor takes longer, and every patient makes them
    /// a little more tired.
    pub fn treat(&mut self, patient: &Patient, now: u64) -> u64 {
        let duration = (patient.time_to_treat as f32 / self.efficiency).ceil().max(1.0) as u64;
        self.busy_until = now + duration;
        self.interaction_time += duration;
        self.patients_seen += 1;
        self.efficiency = (self.efficiency * (1.0 - self.burnout_rate)).max(MIN_EFFICIENCY);
        self.busy_until
    }
}

pub struct DoctorFactory;

impl DoctorFactory {
    pub fn generate_vec_doctors(nbr_doctors: usize, burnout_rate: f32) -> Vec<Doctor> {
        (0..nbr_doctors)
            .map(|i| Doctor::new(i as u64, burnout_rate))
            .collect()
    }
}
