use std::collections::{HashMap, HashSet};

use crate::{Assignment, ParticipantId, SeedError, TierId, Violation};

/// Checks a complete assignment set against every seeding invariant and
/// reports the first breach. Read-only.
///
/// Per tier, in tier order: assignment count, self-assignment, then one gift
/// out and one gift in per participant. Then globally: no giver/recipient pair
/// under more than one tier.
pub fn verify(
    participants: &[ParticipantId],
    tiers: &[TierId],
    assignments: &[Assignment],
) -> Result<(), SeedError> {
    for tier_id in tiers {
        verify_tier(participants, tier_id, assignments)?;
    }

    let mut seen = HashSet::with_capacity(assignments.len());
    for a in assignments {
        if !seen.insert((a.giver_id.as_str(), a.recipient_id.as_str())) {
            return Err(Violation::DuplicatePair {
                giver_id: a.giver_id.clone(),
                recipient_id: a.recipient_id.clone(),
            }
            .into());
        }
    }

    Ok(())
}

fn verify_tier(
    participants: &[ParticipantId],
    tier_id: &TierId,
    assignments: &[Assignment],
) -> Result<(), Violation> {
    let by_tier: Vec<&Assignment> = assignments
        .iter()
        .filter(|a| &a.tier_id == tier_id)
        .collect();

    if by_tier.len() != participants.len() {
        return Err(Violation::WrongCount {
            tier_id: tier_id.clone(),
            expected: participants.len(),
            actual: by_tier.len(),
        });
    }

    let mut outgoing: HashMap<&str, usize> = HashMap::new();
    let mut incoming: HashMap<&str, usize> = HashMap::new();
    for a in &by_tier {
        if a.giver_id == a.recipient_id {
            return Err(Violation::SelfAssignment {
                tier_id: tier_id.clone(),
                participant_id: a.giver_id.clone(),
            });
        }
        *outgoing.entry(a.giver_id.as_str()).or_insert(0) += 1;
        *incoming.entry(a.recipient_id.as_str()).or_insert(0) += 1;
    }

    for id in participants {
        let gives = outgoing.get(id.as_str()).copied().unwrap_or(0);
        if gives != 1 {
            return Err(Violation::GiverCount {
                tier_id: tier_id.clone(),
                participant_id: id.clone(),
                count: gives,
            });
        }
        let receives = incoming.get(id.as_str()).copied().unwrap_or(0);
        if receives != 1 {
            return Err(Violation::RecipientCount {
                tier_id: tier_id.clone(),
                participant_id: id.clone(),
                count: receives,
            });
        }
    }

    Ok(())
}
