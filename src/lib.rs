//! DeSERT: triage scheduling for asynchronously arriving patients.
//!
//! Patients are admitted through an [`ingress`] channel, ranked either by a
//! single hybrid priority queue or by three parallel queues (severity, FCFS,
//! SJF) reconciled by consensus, and handed to doctors in FCFS order.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingress;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod simulation;
pub mod topology;
pub mod util;

pub use error::{TriageError, TriageResult};
