//! Pair selection - UCB over the agent pool with virtual loss
//!
//! Picks which two agents should play next. Scores every eligible agent with
//! the classic UCB1 form `value + c * sqrt(N) / (visits + 1)` and takes the
//! top two. Both visit counts are incremented before the match resolves
//! ("virtual loss") so concurrent selections see in-flight agents at a
//! reduced score and spread work across the pool instead of piling onto the
//! current leaders.
//!
//! Callers must hold the registry lock across the whole call: scoring,
//! picking and the visit increments are one atomic step.

use crate::agent::{canonical_pair, AgentId};
use crate::error::{LadderError, Result};
use crate::registry::Registry;

/// UCB1 score for one arm given the pool-wide visit total.
fn ucb_score(value: f32, visits: u32, total_visits: u64, c: f32) -> f32 {
    value + c * (total_visits as f32).sqrt() / (visits as f32 + 1.0)
}

/// Select the next pair to play, applying virtual loss to both picks.
///
/// Returns the pair in canonical `(lesser, greater)` order. Fails with
/// [`LadderError::NotEnoughAgents`] when the pool holds fewer than two
/// eligible agents.
pub fn select_pair(registry: &mut Registry, c: f32) -> Result<(AgentId, AgentId)> {
    if registry.arms.len() < 2 {
        return Err(LadderError::NotEnoughAgents(registry.arms.len()));
    }

    let total_visits: u64 = registry.arms.values().map(|arm| arm.visits as u64).sum();

    let mut scored: Vec<(&AgentId, f32)> = registry
        .arms
        .iter()
        .map(|(id, arm)| (id, ucb_score(arm.value, arm.visits, total_visits, c)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let first = scored[0].0.clone();
    let second = scored[1].0.clone();
    drop(scored);

    // Virtual loss: charge the visit before the outcome is known.
    for id in [&first, &second] {
        if let Some(arm) = registry.arms.get_mut(id) {
            arm.visits += 1;
        }
    }

    Ok(canonical_pair(first, second))
}

/// Undo the virtual loss of a selection whose match never produced an
/// outcome, restoring pre-selection state so failed matches do not bias
/// future scores.
pub fn release_pair(registry: &mut Registry, a: &AgentId, b: &AgentId) {
    for id in [a, b] {
        if let Some(arm) = registry.arms.get_mut(id) {
            arm.visits = arm.visits.saturating_sub(1);
        }
    }
}
