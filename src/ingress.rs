//! Bounded multi-producer channel that carries arrivals to the scheduler
//! thread.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::config::OverflowPolicy;
use crate::error::{TriageError, TriageResult};
use crate::model::patient::ArrivalEvent;

pub fn channel(capacity: usize, overflow: OverflowPolicy) -> (IngressSender, IngressReceiver) {
    let (sender, receiver) = bounded(capacity);
    (
        IngressSender {
            sender,
            capacity,
            overflow,
        },
        IngressReceiver { receiver },
    )
}

#[derive(Debug, Clone)]
pub struct IngressSender {
    sender: Sender<ArrivalEvent>,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl IngressSender {
    /// Hands an arrival to the scheduler. With `OverflowPolicy::Block` a full
    /// channel makes the caller wait; with `Reject` it fails fast.
    pub fn submit(&self, event: ArrivalEvent) -> TriageResult<()> {
        event.validate()?;
        match self.overflow {
            OverflowPolicy::Block => self
                .sender
                .send(event)
                .map_err(|_| TriageError::SchedulerUnavailable),
            OverflowPolicy::Reject => self.sender.try_send(event).map_err(|e| match e {
                TrySendError::Full(_) => {
                    tracing::warn!(capacity = self.capacity, "ingress full, arrival rejected");
                    TriageError::QueueFull {
                        capacity: self.capacity,
                    }
                }
                TrySendError::Disconnected(_) => TriageError::SchedulerUnavailable,
            }),
        }
    }
}

#[derive(Debug)]
pub struct IngressReceiver {
    receiver: Receiver<ArrivalEvent>,
}

impl IngressReceiver {
    /// Everything currently queued, in submission order.
    pub fn drain(&self) -> Vec<ArrivalEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn inner(&self) -> &Receiver<ArrivalEvent> {
        &self.receiver
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn reject_policy_reports_full_channel() {
        let (sender, receiver) = channel(2, OverflowPolicy::Reject);
        sender.submit(ArrivalEvent::new(3, 1, 10)).unwrap();
        sender.submit(ArrivalEvent::new(3, 2, 10)).unwrap();

        assert!(matches!(
            sender.submit(ArrivalEvent::new(3, 3, 10)),
            Err(TriageError::QueueFull { capacity: 2 })
        ));

        assert_eq!(receiver.inner().try_recv().unwrap().pain_score, 1);
        sender.submit(ArrivalEvent::new(3, 3, 10)).unwrap();
        let rest = receiver.drain();
        assert_eq!(rest.iter().map(|e| e.pain_score).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn block_policy_waits_for_room() {
        let (sender, receiver) = channel(1, OverflowPolicy::Block);
        sender.submit(ArrivalEvent::new(2, 0, 10)).unwrap();

        let producer = {
            let sender = sender.clone();
            thread::spawn(move || sender.submit(ArrivalEvent::new(2, 5, 10)))
        };

        let mut seen = Vec::new();
        while seen.len() < 2 {
            seen.extend(receiver.drain().iter().map(|e| e.pain_score));
            thread::yield_now();
        }
        producer.join().unwrap().unwrap();
        assert_eq!(seen, vec![0, 5]);
    }

    #[test]
    fn invalid_arrivals_never_enter_the_channel() {
        let (sender, receiver) = channel(4, OverflowPolicy::Reject);
        assert!(matches!(
            sender.submit(ArrivalEvent::new(9, 0, 10)),
            Err(TriageError::InvalidArrival(_))
        ));
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn dropped_receiver_means_scheduler_gone() {
        let (sender, receiver) = channel(4, OverflowPolicy::Block);
        drop(receiver);
        assert!(matches!(
            sender.submit(ArrivalEvent::new(2, 0, 10)),
            Err(TriageError::SchedulerUnavailable)
        ));
    }
}
