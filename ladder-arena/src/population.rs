//! Population manager - the outer evaluation loop
//!
//! Drives rounds of concurrent matches over the shared registry, checkpoints
//! after every round, and periodically churns the pool: the weakest agents
//! by bandit value (recent form, not lifetime Elo) are retired and replaced
//! with fresh random samples. Startup resumes from an existing checkpoint
//! when the working directory holds one, otherwise seeds a new population
//! from the network-file directory.

use std::fs;
use std::hash::Hasher;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use rand::Rng;
use rustc_hash::FxHasher;
use serde::Serialize;
use tracing::{info, warn};

use ladder_core::{
    persist, AgentFactory, AgentId, LadderConfig, Registry, NO_NET_HASH, NO_NET_PATH,
};

use crate::pool::{run_round, RoundSummary, ShutdownFlag};
use crate::runner::MatchRunner;

/// One row of the rating table, strongest first
#[derive(Clone, Debug, Serialize)]
pub struct Standing {
    pub net_hash: String,
    pub bandit_name: String,
    pub policy_mode: char,
    pub rating: f32,
    pub value: f32,
    pub visits: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

/// Owns the registry and drives the evaluate/persist/churn cycle
pub struct Ladder {
    config: LadderConfig,
    registry: Mutex<Registry>,
    runner: MatchRunner,
    factory: AgentFactory,
    shutdown: ShutdownFlag,
}

impl Ladder {
    /// Load or initialize state for a run.
    ///
    /// Fatal configuration errors (no checkpoint and no candidate network
    /// files) surface here, before any matches are scheduled.
    pub fn new(config: LadderConfig) -> Result<Self> {
        fs::create_dir_all(&config.working_dir).with_context(|| {
            format!("creating working dir {}", config.working_dir.display())
        })?;

        let mut registry = match persist::load(&config.working_dir)
            .context("loading checkpoint")?
        {
            Some(registry) => {
                info!(
                    agents = registry.population(),
                    networks = registry.directory().len(),
                    "resumed from checkpoint"
                );
                registry
            }
            None => Registry::new(),
        };

        let scanned = scan_networks(&mut registry, &config.network_dir)?;
        if scanned == 0 && registry.directory().is_empty() {
            bail!(
                "no candidate network files in {} and no existing checkpoint",
                config.network_dir.display()
            );
        }
        // The baseline no-network policy is always available as material.
        registry.add_network(NO_NET_HASH, NO_NET_PATH);

        Ok(Self {
            runner: MatchRunner::from_config(&config),
            factory: AgentFactory::new(config.factory.clone()),
            registry: Mutex::new(registry),
            shutdown: ShutdownFlag::new(),
            config,
        })
    }

    /// Clone of the stop signal, for wiring to Ctrl-C or a supervisor
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Drive the evaluation loop for `rounds` rounds (0 = until the
    /// shutdown flag is raised). Blocks the calling thread.
    pub fn run<R: Rng>(&self, rounds: u64, rng: &mut R) -> Result<()> {
        self.ensure_population(rng)?;

        let mut round: u64 = 0;
        loop {
            if self.shutdown.is_set() {
                info!("shutdown requested, stopping after {} rounds", round);
                break;
            }
            if rounds != 0 && round >= rounds {
                break;
            }
            round += 1;

            let summary = run_round(
                &self.registry,
                &self.runner,
                self.config.games_per_round,
                self.config.threads,
                self.config.exploration_c,
                self.config.elo_k,
                &self.shutdown,
            );
            self.log_round(round, &summary);

            // Checkpoint before churn: a consistent, fully-applied batch is
            // on disk even if replacement sampling fails.
            self.checkpoint()?;

            if self.config.churn_interval > 0
                && round % self.config.churn_interval as u64 == 0
                && !self.shutdown.is_set()
            {
                self.churn(rng)?;
            }
        }

        // Clean-shutdown flush so churn and partial rounds are never lost.
        self.checkpoint()?;
        Ok(())
    }

    /// Rating table sorted strongest-first
    pub fn standings(&self) -> Vec<Standing> {
        standings_of(&self.registry.lock().unwrap())
    }

    fn ensure_population<R: Rng>(&self, rng: &mut R) -> Result<()> {
        let mut reg = self.registry.lock().unwrap();
        let added = self
            .factory
            .fill(&mut reg, self.config.max_agents, rng)
            .context("filling initial population")?;
        if added > 0 {
            info!(added, population = reg.population(), "filled population");
        }
        reg.debug_validate();
        Ok(())
    }

    fn log_round(&self, round: u64, summary: &RoundSummary) {
        info!(
            round,
            scheduled = summary.scheduled,
            completed = summary.completed,
            failed = summary.failed,
            "round finished"
        );
    }

    /// Persist all four state files; one retry, then fatal. Losing rating
    /// history silently is worse than stopping the run.
    fn checkpoint(&self) -> Result<()> {
        let reg = self.registry.lock().unwrap();
        if let Err(first) = persist::save(&reg, &self.config.working_dir) {
            warn!(error = %first, "checkpoint write failed, retrying once");
            persist::save(&reg, &self.config.working_dir)
                .context("checkpoint retry failed")?;
        }
        Ok(())
    }

    fn churn<R: Rng>(&self, rng: &mut R) -> Result<()> {
        let mut reg = self.registry.lock().unwrap();
        let retired = retire_and_refill(
            &mut reg,
            self.config.n_replace,
            self.config.max_agents,
            &self.factory,
            self.config.reset_visits_on_churn,
            rng,
        )
        .context("churning population")?;
        for id in &retired {
            info!(agent = %id, "retired");
        }
        info!(
            retired = retired.len(),
            population = reg.population(),
            "population churned"
        );
        Ok(())
    }
}

/// Retire the `n_replace` lowest agents by bandit value and refill the pool
/// to `max_agents` with fresh samples. Optionally resets every visit count
/// so post-churn selection scores are not dominated by pre-churn history.
///
/// Returns the retired identities.
pub fn retire_and_refill<R: Rng>(
    registry: &mut Registry,
    n_replace: usize,
    max_agents: usize,
    factory: &AgentFactory,
    reset_visits: bool,
    rng: &mut R,
) -> ladder_core::Result<Vec<AgentId>> {
    let mut ranked: Vec<(AgentId, f32)> = registry
        .arms()
        .iter()
        .map(|(id, arm)| (id.clone(), arm.value))
        .collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let retired: Vec<AgentId> = ranked
        .into_iter()
        .take(n_replace)
        .map(|(id, _)| id)
        .collect();
    for id in &retired {
        registry.remove_agent(id);
    }

    factory.fill(registry, max_agents, rng)?;

    if reset_visits {
        registry.reset_visits();
    }

    Ok(retired)
}

/// Build the rating table for a registry snapshot, strongest first
pub fn standings_of(registry: &Registry) -> Vec<Standing> {
    let records = registry.records();
    let mut rows: Vec<Standing> = registry
        .arms()
        .iter()
        .map(|(id, arm)| {
            let record = records.get(id).copied().unwrap_or_default();
            Standing {
                net_hash: format!("{:016x}", id.net_hash()),
                bandit_name: id.bandit_name().to_string(),
                policy_mode: id.policy_mode(),
                rating: registry.ratings().get(id).copied().unwrap_or_default(),
                value: arm.value,
                visits: arm.visits,
                wins: record.wins,
                losses: record.losses,
                draws: record.draws,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

/// Hash every regular file in `dir` into the registry's network directory.
/// Returns the number of files registered.
fn scan_networks(registry: &mut Registry, dir: &Path) -> Result<usize> {
    if !dir.exists() {
        // Resumed runs may no longer have the seed directory around.
        if !registry.directory().is_empty() {
            return Ok(0);
        }
        bail!("network directory {} does not exist", dir.display());
    }

    let mut scanned = 0;
    for entry in fs::read_dir(dir)
        .with_context(|| format!("reading network directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }

        let bytes = fs::read(&path)
            .with_context(|| format!("reading network file {}", path.display()))?;
        let mut hasher = FxHasher::default();
        hasher.write(&bytes);
        let hash = hasher.finish();
        if hash == NO_NET_HASH {
            warn!(path = %path.display(), "network file hashes to the reserved value, skipping");
            continue;
        }

        registry.add_network(hash, path);
        scanned += 1;
    }
    Ok(scanned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use ladder_core::registry::WldCounts;
    use ladder_core::FactoryConfig;

    fn seeded_pool(n: usize) -> (Registry, AgentFactory, ChaCha8Rng) {
        let mut registry = Registry::new();
        registry.add_network(NO_NET_HASH, NO_NET_PATH);
        for i in 1..=4u64 {
            registry.add_network(i, format!("/nets/{}.net", i));
        }
        let factory = AgentFactory::new(FactoryConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        factory.fill(&mut registry, n, &mut rng).unwrap();
        (registry, factory, rng)
    }

    #[test]
    fn test_churn_keeps_population_at_cap() {
        let (mut registry, factory, mut rng) = seeded_pool(10);

        // Give everyone some history so fresh agents are identifiable.
        let ids: Vec<AgentId> = registry.arms().keys().cloned().collect();
        for (i, id) in ids.iter().enumerate() {
            let arm = ladder_core::ArmStats {
                value: i as f32 / 10.0,
                visits: 5,
            };
            registry.set_arm(id, arm);
        }

        let retired =
            retire_and_refill(&mut registry, 2, 10, &factory, false, &mut rng).unwrap();

        assert_eq!(retired.len(), 2);
        assert_eq!(registry.population(), 10);
        // The two lowest values (0.0, 0.1) are gone.
        assert!(retired.iter().all(|id| !registry.arms().contains_key(id)));
        let fresh: Vec<_> = registry
            .arms()
            .values()
            .filter(|arm| arm.visits == 0)
            .collect();
        assert_eq!(fresh.len(), 2, "replacements start with zero visits");
    }

    #[test]
    fn test_churn_can_reset_visits() {
        let (mut registry, factory, mut rng) = seeded_pool(6);
        let ids: Vec<AgentId> = registry.arms().keys().cloned().collect();
        for id in &ids {
            registry.set_arm(
                id,
                ladder_core::ArmStats {
                    value: 0.5,
                    visits: 9,
                },
            );
        }

        retire_and_refill(&mut registry, 1, 6, &factory, true, &mut rng).unwrap();
        assert!(registry.arms().values().all(|arm| arm.visits == 0));
    }

    #[test]
    fn test_standings_sorted_by_rating() {
        let (mut registry, _factory, _rng) = seeded_pool(4);
        let ids: Vec<AgentId> = registry.arms().keys().cloned().collect();

        // Play one decisive virtual match to split the ratings.
        let (lesser, greater) = ladder_core::canonical_pair(ids[0].clone(), ids[1].clone());
        for id in [&lesser, &greater] {
            let mut arm = registry.arms()[id];
            arm.visits += 1;
            registry.set_arm(id, arm);
        }
        ladder_core::apply_match(&mut registry, &lesser, &greater, WldCounts::new(2, 0, 0), 8.0)
            .unwrap();

        let standings = standings_of(&registry);
        assert_eq!(standings.len(), 4);
        for pair in standings.windows(2) {
            assert!(pair[0].rating >= pair[1].rating);
        }
        assert_eq!(standings[0].wins, 2);
        assert_eq!(standings.last().unwrap().losses, 2);
    }
}
