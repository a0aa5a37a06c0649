use serde::{Deserialize, Serialize};

/// Where the export machine is in its life cycle.
///
/// Page loads happen synchronously inside `send_next`, so there is no
/// observable "paging" state; likewise "draining" is just `Done` with
/// the close predicate still false.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No pass started yet; waiting for a resume key from the peer.
    Idle,
    /// A pass is active and the next record can be produced.
    Sending,
    /// One record is in flight; nothing more is sent until its outcome
    /// (ack or failure) is observed.
    AwaitingAck,
    /// The pagination pass ended. Re-enterable: a later resume restarts
    /// the machine.
    Done,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

impl Phase {
    /// True while a pass is in progress.
    pub fn is_sending(self) -> bool {
        matches!(self, Phase::Sending | Phase::AwaitingAck)
    }
}

/// The one auto-close eligibility rule, shared by every call site that
/// can change one of its inputs.
pub fn auto_close_ready(auto_close: bool, sending: bool, device_key: u32, upload_key: u32) -> bool {
    auto_close && !sending && upload_key >= device_key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_requires_all_three_conditions() {
        assert!(auto_close_ready(true, false, 10, 10));
        assert!(auto_close_ready(true, false, 10, 12));
        assert!(!auto_close_ready(false, false, 10, 12));
        assert!(!auto_close_ready(true, true, 10, 12));
        assert!(!auto_close_ready(true, false, 10, 9));
    }

    #[test]
    fn sending_covers_in_flight_states() {
        assert!(!Phase::Idle.is_sending());
        assert!(Phase::Sending.is_sending());
        assert!(Phase::AwaitingAck.is_sending());
        assert!(!Phase::Done.is_sending());
    }
}
