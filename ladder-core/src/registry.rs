//! Registry - authoritative in-memory state for the agent pool
//!
//! Holds the four maps the rest of the system operates on: Elo ratings,
//! bandit selection statistics, pairwise results, and the network-hash
//! directory. The registry is created once per run, reloaded from a
//! checkpoint when one exists, and guarded by a single mutex at the arena
//! layer; nothing here takes locks itself.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::agent::{AgentId, NO_NET_HASH, NO_NET_PATH};
use crate::error::{LadderError, Result};

/// Rating assigned to every freshly inserted agent.
pub const INITIAL_RATING: f32 = 1200.0;

/// Bandit selection statistics for one agent: running mean outcome and
/// visit count. A copyable value struct; updates produce a new value rather
/// than mutating in place, so the read-modify-write is a single visible step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ArmStats {
    /// Running mean of observed match scores (0.0 to 1.0)
    pub value: f32,
    /// Number of selections, including in-flight virtual losses
    pub visits: u32,
}

impl ArmStats {
    /// Fold one observed score into the running mean.
    ///
    /// The visit count must already have been incremented by the selection
    /// step's virtual loss, so the observation lands at weight `1/visits`.
    /// A zero visit count means that increment never happened.
    pub fn after_observation(self, side_score: f32) -> Result<ArmStats> {
        if self.visits == 0 {
            return Err(LadderError::NoVirtualLoss(format!(
                "value={} visits=0",
                self.value
            )));
        }
        let n = self.visits as f32;
        Ok(ArmStats {
            value: (self.value * (n - 1.0) + side_score) / n,
            visits: self.visits,
        })
    }
}

/// Accumulated win/loss/draw counts for a canonical pair, counted from the
/// lesser identity's perspective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WldCounts {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl WldCounts {
    pub fn new(wins: u32, losses: u32, draws: u32) -> Self {
        Self {
            wins,
            losses,
            draws,
        }
    }

    /// Total games in this line
    pub fn total(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Empirical score for the lesser side, draws counting half.
    /// Returns an error for an empty line; scoring zero games is meaningless.
    pub fn lesser_score(&self) -> Result<f32> {
        let total = self.total();
        if total == 0 {
            return Err(LadderError::EmptyOutcome);
        }
        Ok((self.wins as f32 + 0.5 * self.draws as f32) / total as f32)
    }

    /// Component-wise sum
    pub fn add(&self, other: &WldCounts) -> WldCounts {
        WldCounts {
            wins: self.wins + other.wins,
            losses: self.losses + other.losses,
            draws: self.draws + other.draws,
        }
    }
}

/// Process-wide pool state. Sole owner of all four maps.
#[derive(Debug, Default)]
pub struct Registry {
    /// Elo rating per agent
    pub(crate) ratings: FxHashMap<AgentId, f32>,
    /// Bandit statistics per agent; only entries here are eligible for
    /// selection, so `arms.len()` is the population size
    pub(crate) arms: FxHashMap<AgentId, ArmStats>,
    /// Pairwise results, keyed canonically lesser-then-greater
    pub(crate) results: FxHashMap<(AgentId, AgentId), WldCounts>,
    /// Network hash to filesystem path; hash 0 is reserved for "no network"
    pub(crate) directory: FxHashMap<u64, PathBuf>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Population size (agents eligible for selection)
    pub fn population(&self) -> usize {
        self.arms.len()
    }

    pub fn ratings(&self) -> &FxHashMap<AgentId, f32> {
        &self.ratings
    }

    pub fn arms(&self) -> &FxHashMap<AgentId, ArmStats> {
        &self.arms
    }

    pub fn results(&self) -> &FxHashMap<(AgentId, AgentId), WldCounts> {
        &self.results
    }

    pub fn directory(&self) -> &FxHashMap<u64, PathBuf> {
        &self.directory
    }

    /// Register a network file under its hash
    pub fn add_network(&mut self, hash: u64, path: impl Into<PathBuf>) {
        self.directory.insert(hash, path.into());
    }

    /// Path of the network file for a hash. The reserved hash 0 resolves to
    /// the baseline marker path understood by the match runner.
    pub fn net_path(&self, hash: u64) -> Option<&Path> {
        if hash == NO_NET_HASH {
            return Some(Path::new(NO_NET_PATH));
        }
        self.directory.get(&hash).map(PathBuf::as_path)
    }

    /// Insert a fresh agent at the initial rating with zeroed bandit stats.
    /// Returns false if the identity is already present.
    pub fn insert_agent(&mut self, id: AgentId) -> bool {
        if self.arms.contains_key(&id) {
            return false;
        }
        self.ratings.insert(id.clone(), INITIAL_RATING);
        self.arms.insert(id, ArmStats::default());
        true
    }

    /// Retire an agent: drop its rating, bandit stats, and every results row
    /// it appears in. Directory entries are kept; the network file remains
    /// available as sampling material for future agents.
    pub fn remove_agent(&mut self, id: &AgentId) {
        self.ratings.remove(id);
        self.arms.remove(id);
        self.results.retain(|(a, b), _| a != id && b != id);
    }

    /// Overwrite an agent's bandit statistics. The agent must already be in
    /// the pool; unknown identities are ignored rather than inserted.
    pub fn set_arm(&mut self, id: &AgentId, arm: ArmStats) {
        if let Some(slot) = self.arms.get_mut(id) {
            *slot = arm;
        }
    }

    /// Zero every visit count while keeping values, so selection scores
    /// start from a clean exploration budget.
    pub fn reset_visits(&mut self) {
        for arm in self.arms.values_mut() {
            arm.visits = 0;
        }
    }

    /// Accumulate a match outcome under its canonical key.
    /// Callers must pass the pair already in `(lesser, greater)` order.
    pub fn record_result(&mut self, lesser: &AgentId, greater: &AgentId, counts: WldCounts) {
        debug_assert!(lesser <= greater, "results key must be canonical");
        let entry = self
            .results
            .entry((lesser.clone(), greater.clone()))
            .or_default();
        *entry = entry.add(&counts);
    }

    /// Per-agent win/loss/draw totals across all opponents, each from that
    /// agent's own perspective, aggregated in one pass over the results map.
    pub fn records(&self) -> FxHashMap<AgentId, WldCounts> {
        let mut totals: FxHashMap<AgentId, WldCounts> = FxHashMap::default();
        for ((lesser, greater), counts) in &self.results {
            let entry = totals.entry(lesser.clone()).or_default();
            *entry = entry.add(counts);
            // Stored from the lesser side; flip wins and losses.
            let flipped = WldCounts::new(counts.losses, counts.wins, counts.draws);
            let entry = totals.entry(greater.clone()).or_default();
            *entry = entry.add(&flipped);
        }
        totals
    }

    /// Check the cross-map invariants in debug builds: every rated agent's
    /// hash resolvable, results keys canonical.
    pub fn debug_validate(&self) {
        #[cfg(debug_assertions)]
        {
            for id in self.ratings.keys().chain(self.arms.keys()) {
                assert!(
                    self.net_path(id.net_hash()).is_some(),
                    "agent {} has no directory entry",
                    id
                );
            }
            for (lesser, greater) in self.results.keys() {
                assert!(lesser <= greater, "non-canonical results key");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(hash: u64, name: &str) -> AgentId {
        AgentId::new(hash, name, 'n').unwrap()
    }

    #[test]
    fn test_arm_stats_running_mean() {
        // (0.5 * 3 + 1.0) / 4 = 0.875
        let arm = ArmStats {
            value: 0.5,
            visits: 4, // virtual loss already applied
        };
        let updated = arm.after_observation(1.0).unwrap();
        assert!((updated.value - 0.875).abs() < 1e-6);
        assert_eq!(updated.visits, 4);
    }

    #[test]
    fn test_arm_stats_zero_visits_rejected() {
        let arm = ArmStats::default();
        assert!(matches!(
            arm.after_observation(1.0),
            Err(LadderError::NoVirtualLoss(_))
        ));
    }

    #[test]
    fn test_wld_lesser_score() {
        let counts = WldCounts::new(3, 1, 2);
        assert!((counts.lesser_score().unwrap() - (4.0 / 6.0)).abs() < 1e-6);
        assert!(matches!(
            WldCounts::default().lesser_score(),
            Err(LadderError::EmptyOutcome)
        ));
    }

    #[test]
    fn test_insert_agent_defaults() {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        assert!(reg.insert_agent(a.clone()));
        assert!(!reg.insert_agent(a.clone()), "duplicate insert is a no-op");
        assert_eq!(reg.ratings[&a], INITIAL_RATING);
        assert_eq!(reg.arms[&a], ArmStats::default());
        assert_eq!(reg.population(), 1);
    }

    #[test]
    fn test_remove_agent_scrubs_results() {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        let b = id(2, "ucb-1.000");
        let c = id(3, "pucb-0.700");
        for agent in [&a, &b, &c] {
            reg.insert_agent(agent.clone());
        }
        reg.record_result(&a, &b, WldCounts::new(1, 0, 0));
        reg.record_result(&b, &c, WldCounts::new(0, 1, 0));

        reg.remove_agent(&b);
        assert_eq!(reg.population(), 2);
        assert!(reg.results.is_empty());
        assert!(!reg.ratings.contains_key(&b));
    }

    #[test]
    fn test_record_result_accumulates() {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        let b = id(2, "ucb-1.000");
        reg.record_result(&a, &b, WldCounts::new(2, 1, 1));
        reg.record_result(&a, &b, WldCounts::new(1, 0, 0));
        assert_eq!(
            reg.results[&(a.clone(), b.clone())],
            WldCounts::new(3, 1, 1)
        );
    }

    #[test]
    fn test_records_flip_greater_side_and_accumulate() {
        let mut reg = Registry::new();
        let a = id(1, "exp3-0.100");
        let b = id(2, "ucb-1.000");
        let c = id(3, "pucb-0.700");
        reg.record_result(&a, &b, WldCounts::new(3, 1, 2));
        reg.record_result(&b, &c, WldCounts::new(0, 2, 0));

        let records = reg.records();
        assert_eq!(records[&a], WldCounts::new(3, 1, 2));
        // b: flipped from the a-b row, plus its own b-c row.
        assert_eq!(records[&b], WldCounts::new(1, 5, 2));
        assert_eq!(records[&c], WldCounts::new(2, 0, 0));
    }

    #[test]
    fn test_net_path_reserved_hash() {
        let mut reg = Registry::new();
        reg.add_network(42, "/nets/a.net");
        assert_eq!(reg.net_path(42).unwrap(), Path::new("/nets/a.net"));
        assert_eq!(reg.net_path(NO_NET_HASH).unwrap(), Path::new(NO_NET_PATH));
        assert!(reg.net_path(99).is_none());
    }
}
