//! Per-tier derangements with cross-tier unique pairings.
//!
//! Each tier is a permutation of the participant list read position by
//! position: participant `i` gives to `perm[i]`. A tier is accepted only when
//! no position maps to itself and no giver repeats a recipient recorded in the
//! run's [`GiverHistory`].

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Assignment, GiverHistory, ParticipantId, SeedError, TierId};

const DEFAULT_TIER_ATTEMPTS: usize = 500;
const DEFAULT_SHUFFLE_ATTEMPTS: usize = 3000;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    #[default]
    Rejection,
    /// Distinct rotation offset per tier over one shuffled seating. Never exhausts.
    Rotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedConfig {
    pub max_tier_attempts: usize,
    pub max_shuffle_attempts: usize,
    pub strategy: SeedStrategy,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            max_tier_attempts: DEFAULT_TIER_ATTEMPTS,
            max_shuffle_attempts: DEFAULT_SHUFFLE_ATTEMPTS,
            strategy: SeedStrategy::Rejection,
        }
    }
}

impl SeedConfig {
    pub fn rotation() -> Self {
        Self {
            strategy: SeedStrategy::Rotation,
            ..Self::default()
        }
    }
}

/// Seeds every tier with the thread-local RNG and default bounds.
pub fn generate(
    participants: &[ParticipantId],
    tiers: &[TierId],
) -> Result<Vec<Assignment>, SeedError> {
    let mut rng = rand::thread_rng();
    generate_with(participants, tiers, &SeedConfig::default(), &mut rng)
}

/// Seeds every tier, in order. All `participants.len() * tiers.len()`
/// assignments or an error, never a partial set.
pub fn generate_with<R: Rng + ?Sized>(
    participants: &[ParticipantId],
    tiers: &[TierId],
    config: &SeedConfig,
    rng: &mut R,
) -> Result<Vec<Assignment>, SeedError> {
    validate(participants, tiers)?;

    let mut history = GiverHistory::new();
    let mut assignments = Vec::with_capacity(participants.len() * tiers.len());

    let rotation = match config.strategy {
        SeedStrategy::Rotation => Some(Rotation::new(participants, tiers.len(), rng)),
        SeedStrategy::Rejection => None,
    };

    for (index, tier_id) in tiers.iter().enumerate() {
        let perm = match &rotation {
            Some(rotation) => rotation.tier(participants, index),
            None => find_tier_perm(participants, tier_id, &history, config, rng)?,
        };

        for (giver, recipient) in participants.iter().zip(perm) {
            debug_assert!(giver != &recipient);
            history.record(giver, &recipient);
            assignments.push(Assignment {
                tier_id: tier_id.clone(),
                giver_id: giver.clone(),
                recipient_id: recipient,
            });
        }
    }

    Ok(assignments)
}

/// Returns a random derangement of `ids`: a shuffle where no id stays at its
/// original index. `None` once `max_attempts` shuffles all had a fixed point.
pub fn derange<R: Rng + ?Sized>(
    ids: &[ParticipantId],
    max_attempts: usize,
    rng: &mut R,
) -> Option<Vec<ParticipantId>> {
    let mut candidate = ids.to_vec();
    for _ in 0..max_attempts {
        candidate.shuffle(rng);
        let fixed_point = candidate.iter().zip(ids).any(|(a, b)| a == b);
        if !fixed_point {
            return Some(candidate);
        }
    }
    None
}

fn validate(participants: &[ParticipantId], tiers: &[TierId]) -> Result<(), SeedError> {
    if participants.len() < 2 {
        return Err(SeedError::InvalidInput(
            "need at least 2 participants".to_string(),
        ));
    }
    if tiers.is_empty() {
        return Err(SeedError::InvalidInput("need at least 1 tier".to_string()));
    }
    if let Some(dup) = first_duplicate(participants) {
        return Err(SeedError::InvalidInput(format!(
            "duplicate participant id {dup}"
        )));
    }
    if let Some(dup) = first_duplicate(tiers) {
        return Err(SeedError::InvalidInput(format!("duplicate tier id {dup}")));
    }
    if tiers.len() > participants.len() - 1 {
        return Err(SeedError::InfeasibleConstraints {
            tiers: tiers.len(),
            participants: participants.len(),
        });
    }
    Ok(())
}

fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().map(String::as_str).find(|id| !seen.insert(*id))
}

fn find_tier_perm<R: Rng + ?Sized>(
    participants: &[ParticipantId],
    tier_id: &TierId,
    history: &GiverHistory,
    config: &SeedConfig,
    rng: &mut R,
) -> Result<Vec<ParticipantId>, SeedError> {
    for attempt in 1..=config.max_tier_attempts {
        let Some(perm) = derange(participants, config.max_shuffle_attempts, rng) else {
            continue;
        };
        if history.conflicts(participants, &perm) {
            continue;
        }
        debug!(tier = %tier_id, attempt, "tier seeded");
        return Ok(perm);
    }

    warn!(
        tier = %tier_id,
        attempts = config.max_tier_attempts,
        "no cross-tier-unique derangement found"
    );
    Err(SeedError::GenerationExhausted {
        tier_id: tier_id.clone(),
        attempts: config.max_tier_attempts,
    })
}

/// Shuffled seating plus one distinct offset per tier. With offsets drawn from
/// `1..n`, seat `s` gives to seat `(s + offset) % n`: never itself, and never
/// the same seat twice across tiers.
struct Rotation {
    seats: Vec<usize>,
    order: Vec<usize>,
    offsets: Vec<usize>,
}

impl Rotation {
    fn new<R: Rng + ?Sized>(participants: &[ParticipantId], tiers: usize, rng: &mut R) -> Self {
        let n = participants.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut seats = vec![0; n];
        for (seat, &index) in order.iter().enumerate() {
            seats[index] = seat;
        }

        let mut offsets: Vec<usize> = (1..n).collect();
        offsets.shuffle(rng);
        offsets.truncate(tiers);

        Self {
            seats,
            order,
            offsets,
        }
    }

    fn tier(&self, participants: &[ParticipantId], tier: usize) -> Vec<ParticipantId> {
        let n = participants.len();
        let offset = self.offsets[tier];
        self.seats
            .iter()
            .map(|&seat| participants[self.order[(seat + offset) % n]].clone())
            .collect()
    }
}
