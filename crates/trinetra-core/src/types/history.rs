//! Per-track match history for identity confirmation.

use std::collections::VecDeque;

/// Fixed-size ring of recent `(candidate_customer_id, cosine_score)`
/// assignments for one track.
///
/// A candidate is confirmed only when the ring is full, the majority id
/// holds at least `majority` of the slots, and its average score clears the
/// history threshold. This suppresses single-frame identity flicker.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<(String, f32)>,
    capacity: usize,
    min_votes: usize,
}

/// Winner of a majority vote over the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct MajorityVote {
    pub customer_id: String,
    pub votes: usize,
    pub avg_score: f32,
}

impl HistoryRing {
    pub fn new(capacity: usize, majority: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            min_votes: majority,
        }
    }

    /// Record an assignment, evicting the oldest entry once full.
    pub fn push(&mut self, candidate_id: &str, score: f32) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((candidate_id.to_string(), score));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The id with the most votes in the ring, with its vote count and
    /// average score. Ties break toward the earliest entry.
    pub fn majority(&self) -> Option<MajorityVote> {
        let mut best: Option<MajorityVote> = None;
        for (id, _) in &self.entries {
            if best.as_ref().is_some_and(|b| b.customer_id == *id) {
                continue;
            }
            let scores: Vec<f32> = self
                .entries
                .iter()
                .filter(|(i, _)| i == id)
                .map(|(_, s)| *s)
                .collect();
            let votes = scores.len();
            if best.as_ref().map_or(true, |b| votes > b.votes) {
                best = Some(MajorityVote {
                    customer_id: id.clone(),
                    votes,
                    avg_score: scores.iter().sum::<f32>() / votes as f32,
                });
            }
        }
        best
    }

    /// Confirmation rule: full ring, majority votes, average score at or
    /// above `threshold`.
    pub fn confirmed(&self, threshold: f32) -> Option<MajorityVote> {
        if !self.is_full() {
            return None;
        }
        self.majority()
            .filter(|m| m.votes >= self.min_votes && m.avg_score >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> HistoryRing {
        HistoryRing::new(5, 3)
    }

    #[test]
    fn not_confirmed_until_full() {
        let mut r = ring();
        for _ in 0..4 {
            r.push("cust_a", 0.95);
        }
        assert!(r.confirmed(0.74).is_none());
        r.push("cust_a", 0.95);
        let vote = r.confirmed(0.74).unwrap();
        assert_eq!(vote.customer_id, "cust_a");
        assert_eq!(vote.votes, 5);
    }

    #[test]
    fn majority_of_three_in_five_confirms() {
        let mut r = ring();
        r.push("cust_a", 0.80);
        r.push("cust_b", 0.75);
        r.push("cust_a", 0.82);
        r.push("cust_b", 0.76);
        r.push("cust_a", 0.78);
        let vote = r.confirmed(0.74).unwrap();
        assert_eq!(vote.customer_id, "cust_a");
        assert_eq!(vote.votes, 3);
        assert!((vote.avg_score - 0.80).abs() < 1e-6);
    }

    #[test]
    fn low_average_blocks_confirmation() {
        let mut r = ring();
        for _ in 0..5 {
            r.push("cust_a", 0.70);
        }
        assert!(r.confirmed(0.74).is_none());
    }

    #[test]
    fn oldest_entry_evicted() {
        let mut r = ring();
        for i in 0..6 {
            r.push(if i == 0 { "old" } else { "new" }, 0.9);
        }
        assert_eq!(r.len(), 5);
        assert_eq!(r.majority().unwrap().customer_id, "new");
        assert_eq!(r.majority().unwrap().votes, 5);
    }
}
