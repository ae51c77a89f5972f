//! Majority voting over validated plate candidates
//!
//! Single-frame OCR reads are unreliable; a decision is only made once
//! three corroborating reads are buffered. The winner is the most
//! frequent candidate, ties broken by first-seen order. The buffer is
//! cleared after every resolution attempt, accepted or not.

use crate::domain::Plate;
use tracing::debug;

/// Corroborating reads required before a vote resolves
pub const DEFAULT_QUORUM: usize = 3;

/// Accumulates validated candidates for the current detection session
pub struct VotingBuffer {
    quorum: usize,
    candidates: Vec<Plate>,
}

impl VotingBuffer {
    pub fn new(quorum: usize) -> Self {
        Self { quorum, candidates: Vec::with_capacity(quorum) }
    }

    /// Append a validated candidate. Returns true once quorum is reached
    /// and the caller should invoke `resolve`.
    pub fn offer(&mut self, candidate: Plate) -> bool {
        debug!(plate = %candidate, buffered = self.candidates.len() + 1, "vote_offered");
        self.candidates.push(candidate);
        self.candidates.len() >= self.quorum
    }

    /// Resolve the vote: stable mode of the buffered multiset.
    /// Clears the buffer unconditionally; returns None below quorum.
    pub fn resolve(&mut self) -> Option<Plate> {
        if self.candidates.len() < self.quorum {
            self.candidates.clear();
            return None;
        }

        // First-seen order is the tie breaker, so count in insertion order
        let mut counted: Vec<(Plate, usize)> = Vec::new();
        for plate in &self.candidates {
            match counted.iter_mut().find(|(p, _)| p == plate) {
                Some((_, n)) => *n += 1,
                None => counted.push((plate.clone(), 1)),
            }
        }

        self.candidates.clear();

        // Take the winner only on a strictly greater count; ties keep
        // the earlier candidate
        let mut winner: Option<(Plate, usize)> = None;
        for (plate, n) in counted {
            match winner {
                Some((_, best)) if n <= best => {}
                _ => winner = Some((plate, n)),
            }
        }

        let winner = winner.map(|(p, _)| p);
        if let Some(ref plate) = winner {
            debug!(plate = %plate, "vote_resolved");
        }
        winner
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Default for VotingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_QUORUM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    #[test]
    fn test_offer_signals_quorum() {
        let mut buffer = VotingBuffer::default();
        assert!(!buffer.offer(plate("RAB123C")));
        assert!(!buffer.offer(plate("RAB123C")));
        assert!(buffer.offer(plate("RAB123C")));
    }

    #[test]
    fn test_plurality_wins() {
        let mut buffer = VotingBuffer::default();
        buffer.offer(plate("RAB123C"));
        buffer.offer(plate("RAB128C")); // single misread
        buffer.offer(plate("RAB123C"));

        assert_eq!(buffer.resolve().unwrap().as_str(), "RAB123C");
    }

    #[test]
    fn test_tie_broken_by_first_seen() {
        let mut buffer = VotingBuffer::new(4);
        buffer.offer(plate("RAB123C"));
        buffer.offer(plate("RAD456E"));
        buffer.offer(plate("RAD456E"));
        buffer.offer(plate("RAB123C"));

        // Both appear twice; RAB123C was seen first
        assert_eq!(buffer.resolve().unwrap().as_str(), "RAB123C");
    }

    #[test]
    fn test_three_way_tie_keeps_earliest() {
        let mut buffer = VotingBuffer::default();
        buffer.offer(plate("RAB123C"));
        buffer.offer(plate("RAD456E"));
        buffer.offer(plate("RAC789F"));

        // Every candidate counted once; the first read wins
        assert_eq!(buffer.resolve().unwrap().as_str(), "RAB123C");
    }

    #[test]
    fn test_buffer_cleared_after_resolve() {
        let mut buffer = VotingBuffer::default();
        for _ in 0..3 {
            buffer.offer(plate("RAB123C"));
        }
        buffer.resolve().unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_resolve_below_quorum_clears_and_yields_none() {
        let mut buffer = VotingBuffer::default();
        buffer.offer(plate("RAB123C"));
        assert!(buffer.resolve().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unanimous_vote() {
        let mut buffer = VotingBuffer::default();
        buffer.offer(plate("RAD456E"));
        buffer.offer(plate("RAD456E"));
        buffer.offer(plate("RAD456E"));
        assert_eq!(buffer.resolve().unwrap().as_str(), "RAD456E");
    }
}
