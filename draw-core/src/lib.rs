use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

mod seed;
mod verify;

pub use seed::{derange, generate, generate_with, SeedConfig, SeedStrategy};
pub use verify::verify;

pub type ParticipantId = String;
pub type TierId = String;

/// One round of gift-giving. Name and budget are carried as metadata only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tier {
    pub id: TierId,
    pub name: Option<String>,
    pub budget_cents: u32,
}

impl Tier {
    /// Default tier used when an event only states how many gifts each person gives.
    /// `index` is zero-based; the name is one-based ("Gift 1", "Gift 2", ...).
    pub fn numbered(id: impl Into<TierId>, index: usize) -> Self {
        Self {
            id: id.into(),
            name: Some(format!("Gift {}", index + 1)),
            budget_cents: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub tier_id: TierId,
    pub giver_id: ParticipantId,
    pub recipient_id: ParticipantId,
}

/// Recipients each giver has already been assigned in earlier tiers of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GiverHistory {
    used: HashMap<ParticipantId, HashSet<ParticipantId>>,
}

impl GiverHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_given(&self, giver: &str, recipient: &str) -> bool {
        self.used
            .get(giver)
            .map(|set| set.contains(recipient))
            .unwrap_or(false)
    }

    /// True when any position of `perm` would repeat a pairing already in the history.
    pub fn conflicts(&self, givers: &[ParticipantId], perm: &[ParticipantId]) -> bool {
        givers
            .iter()
            .zip(perm)
            .any(|(giver, recipient)| self.has_given(giver, recipient))
    }

    pub fn record(&mut self, giver: &str, recipient: &str) {
        self.used
            .entry(giver.to_string())
            .or_default()
            .insert(recipient.to_string());
    }
}

/// An invariant breach found by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("tier {tier_id}: expected {expected} assignments, got {actual}")]
    WrongCount {
        tier_id: TierId,
        expected: usize,
        actual: usize,
    },
    #[error("tier {tier_id}: self-assignment for {participant_id}")]
    SelfAssignment {
        tier_id: TierId,
        participant_id: ParticipantId,
    },
    #[error("tier {tier_id}: {participant_id} gives {count} (expected 1)")]
    GiverCount {
        tier_id: TierId,
        participant_id: ParticipantId,
        count: usize,
    },
    #[error("tier {tier_id}: {participant_id} receives {count} (expected 1)")]
    RecipientCount {
        tier_id: TierId,
        participant_id: ParticipantId,
        count: usize,
    },
    #[error("pair {giver_id}->{recipient_id} used in more than one tier")]
    DuplicatePair {
        giver_id: ParticipantId,
        recipient_id: ParticipantId,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("impossible constraints: {tiers} tiers need at most participants - 1 ({})", .participants.saturating_sub(1))]
    InfeasibleConstraints { tiers: usize, participants: usize },
    #[error("no cross-tier-unique derangement for tier {tier_id} after {attempts} attempts")]
    GenerationExhausted { tier_id: TierId, attempts: usize },
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] Violation),
}

impl SeedError {
    /// Only an exhausted search is worth repeating with fresh randomness.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SeedError::GenerationExhausted { .. })
    }
}

pub fn tier_ids(tiers: &[Tier]) -> Vec<TierId> {
    tiers.iter().map(|t| t.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_tracks_pairs_per_giver() {
        let mut history = GiverHistory::new();
        history.record("p1", "p2");
        history.record("p1", "p3");

        assert!(history.has_given("p1", "p2"));
        assert!(history.has_given("p1", "p3"));
        assert!(!history.has_given("p2", "p1"));
        assert!(!history.has_given("p4", "p1"));
    }

    #[test]
    fn history_conflicts_on_any_repeated_position() {
        let mut history = GiverHistory::new();
        history.record("b", "c");
        let givers: Vec<String> = vec!["a".into(), "b".into(), "c".into()];

        let clean: Vec<String> = vec!["c".into(), "a".into(), "b".into()];
        let repeat: Vec<String> = vec!["b".into(), "c".into(), "a".into()];
        assert!(!history.conflicts(&givers, &clean));
        assert!(history.conflicts(&givers, &repeat));
    }

    #[test]
    fn numbered_tier_is_one_based() {
        let tier = Tier::numbered("t", 0);
        assert_eq!(tier.name.as_deref(), Some("Gift 1"));
        assert_eq!(tier.budget_cents, 0);
    }

    #[test]
    fn tier_ids_keep_tier_order() {
        let tiers = vec![Tier::numbered("t2", 0), Tier::numbered("t1", 1)];
        assert_eq!(tier_ids(&tiers), vec!["t2", "t1"]);

        let participants: Vec<String> = vec!["p1".into(), "p2".into()];
        let out = generate(&participants, &tier_ids(&tiers[..1])).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|a| a.tier_id == "t2"));
    }

    #[test]
    fn only_exhaustion_is_retryable() {
        let exhausted = SeedError::GenerationExhausted {
            tier_id: "t1".into(),
            attempts: 500,
        };
        assert!(exhausted.is_retryable());
        assert!(!SeedError::InvalidInput("x".into()).is_retryable());
        assert!(!SeedError::InfeasibleConstraints {
            tiers: 2,
            participants: 2
        }
        .is_retryable());
    }

    #[test]
    fn infeasible_message_names_the_limit() {
        let err = SeedError::InfeasibleConstraints {
            tiers: 3,
            participants: 3,
        };
        assert_eq!(
            err.to_string(),
            "impossible constraints: 3 tiers need at most participants - 1 (2)"
        );
    }
}
