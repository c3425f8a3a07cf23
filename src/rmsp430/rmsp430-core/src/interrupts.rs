use crate::constants::limits::MAX_PENDING_INTERRUPTS;
use crate::constants::vectors::*;
use heapless::Vec;
use log::{debug, warn};

/// Pending request for service through a vector table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptRequest {
    pub vector: u32,
    pub priority: u8,
}

impl InterruptRequest {
    pub fn new(vector: u32, priority: u8) -> Self {
        Self { vector, priority }
    }

    /// Request with the priority implied by its position in the vector table
    pub fn at(vector: u32) -> Self {
        Self::new(vector, default_priority(vector))
    }

    pub fn is_reset(&self) -> bool {
        self.vector == VECTOR_RESET
    }
}

/// Fixed priority of a vector: higher table address wins
pub fn default_priority(vector: u32) -> u8 {
    if (VECTOR_TABLE_START..=VECTOR_TABLE_END).contains(&vector) {
        ((vector - VECTOR_TABLE_START) / 2) as u8
    } else {
        0
    }
}

/// Pending interrupt set and arbitration
///
/// The controller only tracks requests; entering a service routine is done by
/// the CPU, which asks for the winner between instructions.
pub struct InterruptController {
    pending: Vec<InterruptRequest, MAX_PENDING_INTERRUPTS>,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queues a request, a vector that is already pending is not duplicated
    pub fn raise(&mut self, req: InterruptRequest) {
        if let Some(existing) = self.pending.iter_mut().find(|r| r.vector == req.vector) {
            if req.priority > existing.priority {
                existing.priority = req.priority;
            }
            return;
        }
        debug!(
            "Interrupt raised: vector 0x{:04x} priority {}",
            req.vector, req.priority
        );
        if self.pending.push(req).is_err() {
            warn!("Pending interrupt table full, dropping vector 0x{:04x}", req.vector);
        }
    }

    /// Highest priority pending request, ties go to the higher vector address
    pub fn highest(&self) -> Option<InterruptRequest> {
        self.pending
            .iter()
            .copied()
            .max_by(|a, b| (a.priority, a.vector).cmp(&(b.priority, b.vector)))
    }

    /// Pending reset request, served regardless of GIE
    pub fn reset_request(&self) -> Option<InterruptRequest> {
        self.pending.iter().copied().find(|r| r.is_reset())
    }

    /// Removes a request once its service routine has begun
    pub fn consume(&mut self, vector: u32) {
        if let Some(idx) = self.pending.iter().position(|r| r.vector == vector) {
            self.pending.swap_remove(idx);
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> &[InterruptRequest] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod interrupt_tests {
    use super::*;

    #[test]
    fn duplicate_vectors_are_merged() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_A0, 3));
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_A0, 3));
        assert_eq!(ic.pending().len(), 1);
    }

    #[test]
    fn highest_priority_wins() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_B1, 1));
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_A0, 9));
        ic.raise(InterruptRequest::new(VECTOR_TIMER0_B0, 4));
        assert_eq!(ic.highest().map(|r| r.vector), Some(VECTOR_EUSCI_A0));
    }

    #[test]
    fn ties_go_to_higher_vector() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_B1, 5));
        ic.raise(InterruptRequest::new(VECTOR_TIMER0_B1, 5));
        ic.raise(InterruptRequest::new(VECTOR_EUSCI_A0, 5));
        assert_eq!(ic.highest().map(|r| r.vector), Some(VECTOR_TIMER0_B1));
    }

    #[test]
    fn consume_removes_only_that_vector() {
        let mut ic = InterruptController::new();
        ic.raise(InterruptRequest::at(VECTOR_EUSCI_B1));
        ic.raise(InterruptRequest::at(VECTOR_TIMER0_B0));
        ic.consume(VECTOR_TIMER0_B0);
        assert_eq!(ic.pending(), &[InterruptRequest::at(VECTOR_EUSCI_B1)]);
        ic.consume(VECTOR_EUSCI_B1);
        assert!(!ic.is_pending());
    }

    #[test]
    fn table_position_sets_default_priority() {
        assert_eq!(default_priority(VECTOR_RESET), 15);
        assert_eq!(default_priority(VECTOR_EUSCI_B1), 0);
        assert!(default_priority(VECTOR_TIMER0_B0) > default_priority(VECTOR_EUSCI_A0));
        assert!(InterruptRequest::at(VECTOR_RESET).is_reset());
    }

    #[test]
    fn fr2355_vector_slots() {
        // Descending from reset, one word per source
        let table = [
            VECTOR_RESET,
            VECTOR_SYSNMI,
            VECTOR_UNMI,
            VECTOR_TIMER0_B0,
            VECTOR_TIMER0_B1,
            VECTOR_TIMER1_B0,
            VECTOR_TIMER1_B1,
            VECTOR_TIMER2_B0,
            VECTOR_TIMER2_B1,
            VECTOR_TIMER3_B0,
            VECTOR_TIMER3_B1,
            VECTOR_RTC,
            VECTOR_EUSCI_A0,
            VECTOR_EUSCI_A1,
            VECTOR_EUSCI_B0,
            VECTOR_EUSCI_B1,
        ];
        for (slot, vector) in table.iter().enumerate() {
            assert_eq!(*vector, VECTOR_TABLE_END - 2 * slot as u32);
        }
        assert_eq!(VECTOR_EUSCI_A0, 0xFFE6);
        assert_eq!(VECTOR_EUSCI_B1, VECTOR_TABLE_START);
    }
}
