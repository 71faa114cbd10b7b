use std::collections::HashSet;

use draw_core::{generate, generate_with, verify, SeedConfig, SeedError};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn ids(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix}{i}")).collect()
}

/// Late tiers can leave only a handful of acceptable permutations, so the
/// sampled sizes get a generous bound.
fn roomy() -> SeedConfig {
    SeedConfig {
        max_tier_attempts: 20_000,
        ..SeedConfig::default()
    }
}

/// Participant count plus a tier count well inside the feasible range.
fn sizes() -> impl Strategy<Value = (usize, usize)> {
    (3usize..13).prop_flat_map(|p| (Just(p), 1..=(p - 1).min(4)))
}

proptest! {
    #[test]
    fn generated_draws_always_verify((p, t) in sizes(), seed in any::<u64>()) {
        let participants = ids("P", p);
        let tiers = ids("T", t);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let out = generate_with(&participants, &tiers, &roomy(), &mut rng).unwrap();

        prop_assert_eq!(out.len(), p * t);
        prop_assert!(out.iter().all(|a| a.giver_id != a.recipient_id));
        prop_assert_eq!(verify(&participants, &tiers, &out), Ok(()));

        let expected: HashSet<&str> = participants.iter().map(String::as_str).collect();
        for tier in &tiers {
            let givers: HashSet<&str> = out.iter().filter(|a| &a.tier_id == tier).map(|a| a.giver_id.as_str()).collect();
            let recipients: HashSet<&str> = out.iter().filter(|a| &a.tier_id == tier).map(|a| a.recipient_id.as_str()).collect();
            prop_assert_eq!(&givers, &expected);
            prop_assert_eq!(&recipients, &expected);
        }

        let pairs: HashSet<(&str, &str)> = out.iter().map(|a| (a.giver_id.as_str(), a.recipient_id.as_str())).collect();
        prop_assert_eq!(pairs.len(), out.len());
    }

    #[test]
    fn rotation_covers_the_whole_feasible_range(p in 2usize..30, seed in any::<u64>()) {
        let participants = ids("P", p);
        let tiers = ids("T", p - 1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let out = generate_with(&participants, &tiers, &SeedConfig::rotation(), &mut rng).unwrap();

        prop_assert_eq!(out.len(), p * (p - 1));
        prop_assert_eq!(verify(&participants, &tiers, &out), Ok(()));
    }

    #[test]
    fn too_many_tiers_is_infeasible(p in 2usize..10, extra in 0usize..5) {
        let participants = ids("P", p);
        let tiers = ids("T", p + extra);

        let err = generate(&participants, &tiers).unwrap_err();

        prop_assert_eq!(err, SeedError::InfeasibleConstraints { tiers: p + extra, participants: p });
    }
}

#[test]
fn hundred_randomized_trials_pass() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    for trial in 0..100u64 {
        let p = 3 + (trial as usize % 10);
        let t = 1 + (trial as usize % (p - 1).min(4));
        let participants = ids(&format!("P{trial}-"), p);
        let tiers = ids(&format!("T{trial}-"), t);

        let out = generate_with(&participants, &tiers, &roomy(), &mut rng)
            .unwrap_or_else(|e| panic!("trial {trial} (P={p}, T={t}) failed: {e}"));
        verify(&participants, &tiers, &out)
            .unwrap_or_else(|e| panic!("trial {trial} (P={p}, T={t}) failed: {e}"));
    }
}
