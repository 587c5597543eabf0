use vinoslot_core::RequestStatus;

use crate::{Result, SessionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    InFlight,
    Complete(RequestStatus),
}

/// Refers to one submission on one slot, as returned by `execute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestHandle {
    pub slot: usize,
    /// Session-wide submission counter, starting at 1.
    pub submission: u64,
}

/// Bookkeeping for the backend's request slots; the slots themselves live
/// in the compiled network.
#[derive(Debug)]
pub(crate) struct SlotPool {
    states: Vec<SlotState>,
    submitted: u64,
    last: Option<RequestHandle>,
}

impl SlotPool {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            states: vec![SlotState::Idle; count],
            submitted: 0,
            last: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn state(&self, slot: usize) -> Result<SlotState> {
        self.states
            .get(slot)
            .copied()
            .ok_or(SessionError::InvalidRequestSlot {
                slot,
                count: self.states.len(),
            })
    }

    pub(crate) fn check_free(&self, slot: usize) -> Result<()> {
        match self.state(slot)? {
            SlotState::InFlight => Err(SessionError::SlotBusy { slot }),
            SlotState::Idle | SlotState::Complete(_) => Ok(()),
        }
    }

    pub(crate) fn mark_submitted(&mut self, slot: usize) -> RequestHandle {
        self.record(slot, SlotState::InFlight)
    }

    /// A submission the backend refused. It still counts as the latest one,
    /// so neither this slot nor a named read returns an older result.
    pub(crate) fn mark_rejected(&mut self, slot: usize) -> RequestHandle {
        self.record(slot, SlotState::Complete(RequestStatus::GeneralError))
    }

    fn record(&mut self, slot: usize, state: SlotState) -> RequestHandle {
        self.submitted += 1;
        let handle = RequestHandle {
            slot,
            submission: self.submitted,
        };
        self.states[slot] = state;
        self.last = Some(handle);
        handle
    }

    pub(crate) fn mark_complete(&mut self, slot: usize, status: RequestStatus) {
        self.states[slot] = SlotState::Complete(status);
    }

    pub(crate) fn last_submitted(&self) -> Option<RequestHandle> {
        self.last
    }

    /// Fails unless the slot finished successfully.
    pub(crate) fn check_readable(&self, slot: usize) -> Result<()> {
        match self.state(slot)? {
            SlotState::Complete(RequestStatus::Ok) => Ok(()),
            _ => Err(SessionError::OutputNotReady { slot }),
        }
    }
}
