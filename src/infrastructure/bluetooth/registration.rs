//! Registration Queue
//!
//! The host stack accepts one "add service" at a time. The queue hands out
//! at most one submission and only releases the next after the host has
//! reported a verdict for the current one. A failure drains everything
//! still waiting. Server readiness lives here too, so checking it and
//! queueing happen under the same lock.

use crate::domain::gatt::Service;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// What the caller has to do after feeding a result into the queue
#[derive(Debug)]
pub enum RegistrationStep {
    /// The service is now registered; submit `next` if there is one
    Confirmed { next: Option<Arc<Service>> },
    /// The service was rejected and `dropped` queued services were discarded
    Failed { dropped: usize },
    /// A result for something that is not in flight
    Ignored,
}

#[derive(Debug, Default)]
pub struct RegistrationQueue {
    pending: VecDeque<Arc<Service>>,
    in_flight: Option<Uuid>,
    confirmed: HashSet<Uuid>,
    server_ready: bool,
}

impl RegistrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `service`. Returns it back for submission when nothing is in
    /// flight and the server is ready. A service that is already confirmed,
    /// in flight or waiting is refused.
    pub fn enqueue(&mut self, service: Arc<Service>) -> Option<Arc<Service>> {
        let uuid = service.uuid();
        if self.contains(&uuid) {
            warn!(service = %uuid, "Service already registered or queued, ignoring");
            return None;
        }
        self.pending.push_back(service);
        if self.server_ready {
            self.next_submission()
        } else {
            None
        }
    }

    /// Mark the server as open and claim whatever was queued before it.
    pub fn server_opened(&mut self) -> Option<Arc<Service>> {
        self.server_ready = true;
        self.next_submission()
    }

    fn contains(&self, service: &Uuid) -> bool {
        self.confirmed.contains(service)
            || self.in_flight == Some(*service)
            || self.pending.iter().any(|s| s.uuid() == *service)
    }

    /// Claim the next pending service if the submission slot is free.
    pub fn next_submission(&mut self) -> Option<Arc<Service>> {
        if self.in_flight.is_some() {
            return None;
        }
        let service = self.pending.pop_front()?;
        self.in_flight = Some(service.uuid());
        Some(service)
    }

    /// Feed the host's verdict for `service`.
    pub fn on_result(&mut self, service: Uuid, success: bool) -> RegistrationStep {
        if self.in_flight != Some(service) {
            return RegistrationStep::Ignored;
        }
        self.in_flight = None;

        if success {
            self.confirmed.insert(service);
            RegistrationStep::Confirmed {
                next: self.next_submission(),
            }
        } else {
            RegistrationStep::Failed {
                dropped: self.drain(),
            }
        }
    }

    /// The in-flight submission could not be handed to the host at all.
    /// Treated like a negative verdict; returns the number of dropped entries.
    pub fn fail_in_flight(&mut self) -> usize {
        self.in_flight = None;
        self.drain()
    }

    fn drain(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn is_registered(&self, service: &Uuid) -> bool {
        self.confirmed.contains(service)
    }

    pub fn in_flight(&self) -> Option<Uuid> {
        self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget everything, e.g. after the server was closed.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.in_flight = None;
        self.confirmed.clear();
        self.server_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::uuids::ble_uuid;

    fn services(n: u16) -> Vec<Arc<Service>> {
        (0..n)
            .map(|i| Arc::new(Service::primary(ble_uuid(0x1800 + i))))
            .collect()
    }

    fn open_queue() -> RegistrationQueue {
        let mut queue = RegistrationQueue::new();
        assert!(queue.server_opened().is_none());
        queue
    }

    #[test]
    fn test_successes_submit_every_service_in_order() {
        let all = services(5);
        let mut queue = open_queue();
        let mut submitted = Vec::new();

        for service in &all {
            if let Some(s) = queue.enqueue(service.clone()) {
                submitted.push(s.uuid());
            }
        }
        // Only the first goes out before any verdict
        assert_eq!(submitted.len(), 1);

        while let Some(current) = queue.in_flight() {
            match queue.on_result(current, true) {
                RegistrationStep::Confirmed { next: Some(s) } => submitted.push(s.uuid()),
                RegistrationStep::Confirmed { next: None } => {}
                other => panic!("unexpected step {other:?}"),
            }
        }

        let expected: Vec<_> = all.iter().map(|s| s.uuid()).collect();
        assert_eq!(submitted, expected);
        assert!(all.iter().all(|s| queue.is_registered(&s.uuid())));
    }

    #[test]
    fn test_failure_stops_further_submissions() {
        let all = services(5);
        let mut queue = open_queue();
        for service in &all {
            queue.enqueue(service.clone());
        }

        // Confirm two, fail the third
        for _ in 0..2 {
            let current = queue.in_flight().unwrap();
            assert!(matches!(
                queue.on_result(current, true),
                RegistrationStep::Confirmed { next: Some(_) }
            ));
        }
        let third = queue.in_flight().unwrap();
        assert!(matches!(
            queue.on_result(third, false),
            RegistrationStep::Failed { dropped: 2 }
        ));

        assert_eq!(queue.in_flight(), None);
        assert_eq!(queue.pending_len(), 0);
        assert!(queue.next_submission().is_none());
        assert!(!queue.is_registered(&third));
    }

    #[test]
    fn test_second_service_waits_for_first_verdict() {
        let all = services(2);
        let (a, b) = (all[0].clone(), all[1].clone());
        let mut queue = open_queue();

        assert_eq!(queue.enqueue(a.clone()).map(|s| s.uuid()), Some(a.uuid()));
        assert!(queue.enqueue(b.clone()).is_none());
        assert!(queue.next_submission().is_none());

        match queue.on_result(a.uuid(), false) {
            RegistrationStep::Failed { dropped } => assert_eq!(dropped, 1),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(!queue.is_registered(&b.uuid()));
    }

    #[test]
    fn test_enqueue_before_server_ready() {
        let all = services(2);
        let mut queue = RegistrationQueue::new();

        assert!(queue.enqueue(all[0].clone()).is_none());
        assert!(queue.enqueue(all[1].clone()).is_none());
        assert_eq!(queue.pending_len(), 2);
        assert!(queue.next_submission().is_none());

        let first = queue.server_opened().unwrap();
        assert_eq!(first.uuid(), all[0].uuid());
        // Later arrivals go straight into the same queue
        assert!(queue.enqueue(services(3)[2].clone()).is_none());
        assert_eq!(queue.pending_len(), 2);
    }

    #[test]
    fn test_stray_result_is_ignored() {
        let all = services(2);
        let mut queue = open_queue();
        queue.enqueue(all[0].clone());

        assert!(matches!(
            queue.on_result(all[1].uuid(), true),
            RegistrationStep::Ignored
        ));
        assert_eq!(queue.in_flight(), Some(all[0].uuid()));
    }

    #[test]
    fn test_submit_error_drains() {
        let all = services(3);
        let mut queue = open_queue();
        for service in &all {
            queue.enqueue(service.clone());
        }
        assert_eq!(queue.fail_in_flight(), 2);
        assert!(queue.next_submission().is_none());
    }

    #[test]
    fn test_duplicate_enqueue_is_refused() {
        let all = services(2);
        let mut queue = open_queue();

        assert!(queue.enqueue(all[0].clone()).is_some());
        assert!(queue.enqueue(all[1].clone()).is_none());
        // In flight and pending duplicates
        assert!(queue.enqueue(all[0].clone()).is_none());
        assert!(queue.enqueue(all[1].clone()).is_none());
        assert_eq!(queue.pending_len(), 1);

        assert!(matches!(
            queue.on_result(all[0].uuid(), true),
            RegistrationStep::Confirmed { next: Some(_) }
        ));
        // Confirmed duplicate
        assert!(queue.enqueue(all[0].clone()).is_none());
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_rejected_service_can_be_enqueued_again() {
        let all = services(1);
        let mut queue = open_queue();
        queue.enqueue(all[0].clone());
        queue.on_result(all[0].uuid(), false);

        assert!(queue.enqueue(all[0].clone()).is_some());
    }

    #[test]
    fn test_reset_closes_the_server() {
        let all = services(1);
        let mut queue = open_queue();
        queue.reset();
        assert!(queue.enqueue(all[0].clone()).is_none());
        assert_eq!(queue.pending_len(), 1);
    }
}
