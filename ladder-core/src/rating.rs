//! Rating updates - Elo, bandit statistics and pairwise results
//!
//! Applies one completed match outcome to all three statistic maps in a
//! single step. Like selection, this must run under the registry lock so no
//! two updates interleave their read-modify-write on the same agent.

use crate::agent::AgentId;
use crate::error::{LadderError, Result};
use crate::registry::{Registry, WldCounts};

/// Expected score of the lesser side under the Elo logistic model.
pub fn expected_score(rating_lesser: f32, rating_greater: f32) -> f32 {
    1.0 / (1.0 + 10f32.powf((rating_greater - rating_lesser) / 400.0))
}

/// Apply a finished match to ratings, bandit statistics and results.
///
/// `counts` is from the lesser side's perspective and must cover at least
/// one game. Both agents must still be registered and must carry the
/// virtual-loss visit from their selection; a zero visit count is an
/// invariant violation surfaced as [`LadderError::NoVirtualLoss`].
pub fn apply_match(
    registry: &mut Registry,
    lesser: &AgentId,
    greater: &AgentId,
    counts: WldCounts,
    k: f32,
) -> Result<()> {
    let score = counts.lesser_score()?;

    let rating_lesser = *registry
        .ratings
        .get(lesser)
        .ok_or_else(|| LadderError::UnknownAgent(lesser.to_string()))?;
    let rating_greater = *registry
        .ratings
        .get(greater)
        .ok_or_else(|| LadderError::UnknownAgent(greater.to_string()))?;

    // Fold the observation into both running means first; this is the step
    // that can fail, and it must fail before any rating moves.
    let arm_lesser = registry
        .arms
        .get(lesser)
        .ok_or_else(|| LadderError::UnknownAgent(lesser.to_string()))?
        .after_observation(score)?;
    let arm_greater = registry
        .arms
        .get(greater)
        .ok_or_else(|| LadderError::UnknownAgent(greater.to_string()))?
        .after_observation(1.0 - score)?;
    registry.arms.insert(lesser.clone(), arm_lesser);
    registry.arms.insert(greater.clone(), arm_greater);

    registry.record_result(lesser, greater, counts);

    let expected = expected_score(rating_lesser, rating_greater);
    registry
        .ratings
        .insert(lesser.clone(), rating_lesser + k * (score - expected));
    registry.ratings.insert(
        greater.clone(),
        rating_greater + k * ((1.0 - score) - (1.0 - expected)),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ArmStats;

    fn id(hash: u64, name: &str) -> AgentId {
        AgentId::new(hash, name, 'n').unwrap()
    }

    /// Two-agent registry with one virtual loss already charged to each,
    /// as selection would leave it.
    fn selected_pair() -> (Registry, AgentId, AgentId) {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        let b = id(2, "ucb-1.000");
        reg.insert_agent(a.clone());
        reg.insert_agent(b.clone());
        for agent in [&a, &b] {
            reg.arms.get_mut(agent).unwrap().visits += 1;
        }
        (reg, a, b)
    }

    #[test]
    fn test_expected_score_equal_ratings() {
        assert!((expected_score(1200.0, 1200.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_expected_score_favors_higher_rating() {
        let e = expected_score(1400.0, 1200.0);
        assert!(e > 0.7 && e < 0.8, "200 points is roughly 76%: {}", e);
        assert!((expected_score(1200.0, 1400.0) - (1.0 - e)).abs() < 1e-6);
    }

    #[test]
    fn test_even_draw_leaves_ratings_unchanged() {
        let (mut reg, a, b) = selected_pair();
        apply_match(&mut reg, &a, &b, WldCounts::new(0, 0, 2), 8.0).unwrap();
        assert_eq!(reg.ratings()[&a], 1200.0);
        assert_eq!(reg.ratings()[&b], 1200.0);
    }

    #[test]
    fn test_win_moves_ratings_by_half_k() {
        // 1200 vs 1200, K=8, lesser wins: 1204 / 1196.
        let (mut reg, a, b) = selected_pair();
        apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap();
        assert!((reg.ratings()[&a] - 1204.0).abs() < 1e-3);
        assert!((reg.ratings()[&b] - 1196.0).abs() < 1e-3);
    }

    #[test]
    fn test_arm_values_move_in_opposite_directions() {
        let (mut reg, a, b) = selected_pair();
        apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap();
        assert!((reg.arms()[&a].value - 1.0).abs() < 1e-6);
        assert!((reg.arms()[&b].value - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_double_apply_is_not_a_noop() {
        let (mut reg, a, b) = selected_pair();
        apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap();
        let rating_after_one = reg.ratings()[&a];

        // Second application needs its own virtual loss, like a real match.
        for agent in [&a, &b] {
            reg.arms.get_mut(agent).unwrap().visits += 1;
        }
        apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap();

        assert_eq!(reg.results()[&(a.clone(), b.clone())], WldCounts::new(2, 0, 0));
        assert!(
            reg.ratings()[&a] > rating_after_one,
            "ratings must move again on repeat outcomes"
        );
    }

    #[test]
    fn test_zero_visits_is_invariant_violation() {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        let b = id(2, "ucb-1.000");
        reg.insert_agent(a.clone());
        reg.insert_agent(b.clone());

        let err = apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap_err();
        assert!(matches!(err, LadderError::NoVirtualLoss(_)));
    }

    #[test]
    fn test_running_mean_example() {
        let (mut reg, a, b) = selected_pair();
        // Arrange the documented scenario: value 0.5 over 3 completed
        // visits, fourth visit in flight.
        reg.arms.insert(a.clone(), ArmStats { value: 0.5, visits: 4 });
        apply_match(&mut reg, &a, &b, WldCounts::new(1, 0, 0), 8.0).unwrap();
        assert!((reg.arms()[&a].value - 0.875).abs() < 1e-6);
    }

    #[test]
    fn test_empty_outcome_rejected() {
        let (mut reg, a, b) = selected_pair();
        assert!(matches!(
            apply_match(&mut reg, &a, &b, WldCounts::default(), 8.0),
            Err(LadderError::EmptyOutcome)
        ));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let (mut reg, a, b) = selected_pair();
        let ghost = id(9, "pucb-0.700");
        assert!(matches!(
            apply_match(&mut reg, &a, &ghost, WldCounts::new(1, 0, 0), 8.0),
            Err(LadderError::UnknownAgent(_))
        ));
        let _ = (a, b);
    }
}
