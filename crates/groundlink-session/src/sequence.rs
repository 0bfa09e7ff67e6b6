//! Receive-side sequence tracking.

/// How an inbound data frame relates to what was already accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxVerdict {
    /// Next in order; deliver and acknowledge.
    Accept,
    /// Same as the last accepted frame; acknowledge again, do not deliver.
    Duplicate,
    /// Anything else; drop without acknowledging.
    OutOfOrder,
}

/// Last accepted receive sequence number, wrapping at 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxSequence {
    last: Option<u8>,
}

impl RxSequence {
    pub fn classify(&self, seq: u8) -> RxVerdict {
        match self.last {
            None => RxVerdict::Accept,
            Some(last) if seq == last => RxVerdict::Duplicate,
            Some(last) if seq == last.wrapping_add(1) => RxVerdict::Accept,
            Some(_) => RxVerdict::OutOfOrder,
        }
    }

    pub fn accept(&mut self, seq: u8) {
        self.last = Some(seq);
    }

    /// Align with a peer that announced `next` as its next data sequence.
    pub fn expect_next(&mut self, next: u8) {
        self.last = Some(next.wrapping_sub(1));
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_accepted() {
        assert_eq!(RxSequence::default().classify(42), RxVerdict::Accept);
    }

    #[test]
    fn classifies_relative_to_last() {
        let mut rx = RxSequence::default();
        rx.accept(7);
        assert_eq!(rx.classify(8), RxVerdict::Accept);
        assert_eq!(rx.classify(7), RxVerdict::Duplicate);
        assert_eq!(rx.classify(6), RxVerdict::OutOfOrder);
        assert_eq!(rx.classify(9), RxVerdict::OutOfOrder);
    }

    #[test]
    fn wraps_at_256() {
        let mut rx = RxSequence::default();
        rx.accept(255);
        assert_eq!(rx.classify(0), RxVerdict::Accept);
        rx.accept(0);
        assert_eq!(rx.classify(255), RxVerdict::OutOfOrder);
    }

    #[test]
    fn expect_next_aligns_with_announced_sequence() {
        let mut rx = RxSequence::default();
        rx.expect_next(0);
        assert_eq!(rx.last(), Some(255));
        assert_eq!(rx.classify(0), RxVerdict::Accept);
        assert_eq!(rx.classify(1), RxVerdict::OutOfOrder);
    }
}
