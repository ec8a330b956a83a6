//! Operational configuration for a ladder run

use std::path::PathBuf;
use std::time::Duration;

use crate::factory::FactoryConfig;

/// Everything the population manager needs to drive a run. Built by the CLI
/// from flags; components receive it by reference instead of reading ambient
/// global state.
#[derive(Clone, Debug)]
pub struct LadderConfig {
    /// Directory holding the four checkpoint files
    pub working_dir: PathBuf,
    /// Directory of candidate network files scanned on fresh startup
    pub network_dir: PathBuf,
    /// Path to the external match-runner executable
    pub runner_exe: PathBuf,
    /// Per-side search effort handed to the match runner
    pub search_effort: u32,
    /// Optional team/constraint file forwarded to the match runner
    pub teams_path: Option<PathBuf>,
    /// Worker-pool size for concurrent matches
    pub threads: usize,
    /// Population cap
    pub max_agents: usize,
    /// Agents retired and replaced per churn cycle
    pub n_replace: usize,
    /// Matches scheduled per round
    pub games_per_round: usize,
    /// Churn every this many rounds
    pub churn_interval: u32,
    /// Reset all visit counts after churn to decorrelate future selection
    /// scores from retired history
    pub reset_visits_on_churn: bool,
    /// UCB exploration constant for pair selection
    pub exploration_c: f32,
    /// Elo K-factor
    pub elo_k: f32,
    /// Optional per-match wall-clock limit; expiry is a recoverable error
    pub match_timeout: Option<Duration>,
    /// Sampling configuration for fresh agents
    pub factory: FactoryConfig,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("ladder-run"),
            network_dir: PathBuf::from("networks"),
            runner_exe: PathBuf::from("./release/vs"),
            search_effort: 1 << 12,
            teams_path: None,
            threads: 1,
            max_agents: 32,
            n_replace: 8,
            games_per_round: 256,
            churn_interval: 1,
            reset_visits_on_churn: false,
            exploration_c: 1.0,
            elo_k: 8.0,
            match_timeout: None,
            factory: FactoryConfig::default(),
        }
    }
}

impl LadderConfig {
    /// Set the worker-pool size
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the population cap and per-cycle replacement count
    pub fn with_population(mut self, max_agents: usize, n_replace: usize) -> Self {
        self.max_agents = max_agents;
        self.n_replace = n_replace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_reference_run() {
        let config = LadderConfig::default();
        assert_eq!(config.max_agents, 32);
        assert_eq!(config.n_replace, 8);
        assert_eq!(config.search_effort, 4096);
        assert_eq!(config.threads, 1);
        assert!(config.match_timeout.is_none());
    }

    #[test]
    fn test_with_threads_floors_at_one() {
        let config = LadderConfig::default().with_threads(0);
        assert_eq!(config.threads, 1);
    }
}
