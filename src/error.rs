use crate::model::patient::PatientId;

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("queue is empty")]
    EmptyQueue,
    #[error("patient {id} has already been dispatched")]
    AlreadyDispatched { id: PatientId },
    #[error("ingress is full (capacity {capacity})")]
    QueueFull { capacity: usize },
    #[error("severity of patient {id} cannot move from {current} to {requested}")]
    EscalationRejected {
        id: PatientId,
        current: u32,
        requested: u32,
    },
    #[error("invalid arrival: {0}")]
    InvalidArrival(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("scheduler is not running")]
    SchedulerUnavailable,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TriageResult<T> = Result<T, TriageError>;
