//! Agent factory - sampling fresh competitor configurations
//!
//! New agents are drawn at random: a network file from the directory, a
//! bandit family from the enabled set with a log-uniformly sampled
//! hyperparameter, and a policy mode from the enabled alphabet. The
//! log-uniform draw matters because both gamma and c behave multiplicatively;
//! sampling `exp(uniform(ln min, ln max))` covers the useful decades evenly.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::agent::AgentId;
use crate::error::{LadderError, Result};
use crate::registry::Registry;

/// In-game exploration strategy family an agent searches with. The numeric
/// hyperparameter is gamma for the exp3 variants and c for the ucb variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BanditFamily {
    Exp3,
    PExp3,
    P2Exp3,
    Ucb,
    PUcb,
}

impl BanditFamily {
    pub const ALL: [BanditFamily; 5] = [
        BanditFamily::Exp3,
        BanditFamily::PExp3,
        BanditFamily::P2Exp3,
        BanditFamily::Ucb,
        BanditFamily::PUcb,
    ];

    /// Name prefix encoded into the agent's bandit name
    pub fn prefix(&self) -> &'static str {
        match self {
            BanditFamily::Exp3 => "exp3",
            BanditFamily::PExp3 => "pexp3",
            BanditFamily::P2Exp3 => "p2exp3",
            BanditFamily::Ucb => "ucb",
            BanditFamily::PUcb => "pucb",
        }
    }

    /// Whether the hyperparameter is an exp3 gamma (true) or a ucb c (false)
    pub fn uses_gamma(&self) -> bool {
        matches!(
            self,
            BanditFamily::Exp3 | BanditFamily::PExp3 | BanditFamily::P2Exp3
        )
    }
}

/// Sampling configuration for new agents
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// Bandit families eligible for sampling
    pub families: Vec<BanditFamily>,
    /// Log-uniform range for exp3-family gamma
    pub gamma_range: (f64, f64),
    /// Log-uniform range for ucb-family exploration c
    pub c_range: (f64, f64),
    /// Policy modes eligible for sampling
    pub policy_modes: Vec<char>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            families: BanditFamily::ALL.to_vec(),
            gamma_range: (0.03, 0.3),
            c_range: (0.5, 2.0),
            policy_modes: vec!['n', 'e'],
        }
    }
}

impl FactoryConfig {
    /// Restrict sampling to the given families
    pub fn with_families(mut self, families: Vec<BanditFamily>) -> Self {
        self.families = families;
        self
    }

    /// Restrict sampling to the given policy modes
    pub fn with_policy_modes(mut self, modes: Vec<char>) -> Self {
        self.policy_modes = modes;
        self
    }
}

/// Produces new random agents over a registry's network directory
#[derive(Clone, Debug)]
pub struct AgentFactory {
    config: FactoryConfig,
}

impl AgentFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self { config }
    }

    /// Sample one fresh identity. Does not insert it anywhere.
    ///
    /// Fails with [`LadderError::EmptyDirectory`] when no network files are
    /// registered, and with a configuration error when the enabled family or
    /// mode sets are empty.
    pub fn new_agent<R: Rng>(&self, registry: &Registry, rng: &mut R) -> Result<AgentId> {
        if registry.directory().is_empty() {
            return Err(LadderError::EmptyDirectory);
        }

        let hashes: Vec<u64> = registry.directory().keys().copied().collect();
        let net_hash = *hashes.choose(rng).expect("directory checked non-empty");

        let family = *self
            .config
            .families
            .choose(rng)
            .ok_or_else(|| LadderError::Config("no bandit families enabled".to_string()))?;
        let (min, max) = if family.uses_gamma() {
            self.config.gamma_range
        } else {
            self.config.c_range
        };
        let param = sample_log_uniform(min, max, rng);

        let policy_mode = *self
            .config
            .policy_modes
            .choose(rng)
            .ok_or_else(|| LadderError::Config("no policy modes enabled".to_string()))?;

        // Three decimals keeps the longest family prefix within the 14-byte
        // name budget: "p2exp3-" + "99.999" is 13 bytes.
        let bandit_name = format!("{}-{:.3}", family.prefix(), param);

        AgentId::new(net_hash, bandit_name, policy_mode)
    }

    /// Insert fresh agents until the population reaches `target`.
    ///
    /// Sampled duplicates of live agents are discarded and redrawn; gives up
    /// with a configuration error when the combination space is too small to
    /// ever reach the target.
    pub fn fill<R: Rng>(
        &self,
        registry: &mut Registry,
        target: usize,
        rng: &mut R,
    ) -> Result<usize> {
        let mut added = 0;
        let mut attempts = 0;
        let max_attempts = 100 * target.max(1);

        while registry.population() < target {
            if attempts >= max_attempts {
                return Err(LadderError::Config(format!(
                    "could not fill population to {} after {} samples (pool at {})",
                    target,
                    attempts,
                    registry.population()
                )));
            }
            attempts += 1;

            let agent = self.new_agent(registry, rng)?;
            if registry.insert_agent(agent) {
                added += 1;
            }
        }

        Ok(added)
    }
}

/// Draw from `exp(uniform(ln min, ln max))`
fn sample_log_uniform<R: Rng>(min: f64, max: f64, rng: &mut R) -> f64 {
    debug_assert!(min > 0.0 && max >= min, "log-uniform needs 0 < min <= max");
    if min == max {
        return min;
    }
    rng.gen_range(min.ln()..max.ln()).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::agent::NO_NET_HASH;
    use crate::registry::INITIAL_RATING;

    fn registry_with_networks(n: u64) -> Registry {
        let mut reg = Registry::new();
        reg.add_network(NO_NET_HASH, "mc");
        for i in 1..=n {
            reg.add_network(i, format!("/nets/{}.net", i));
        }
        reg
    }

    #[test]
    fn test_new_agent_empty_directory_fails() {
        let reg = Registry::new();
        let factory = AgentFactory::new(FactoryConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            factory.new_agent(&reg, &mut rng),
            Err(LadderError::EmptyDirectory)
        ));
    }

    #[test]
    fn test_new_agent_fields_within_bounds() {
        let reg = registry_with_networks(3);
        let factory = AgentFactory::new(FactoryConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let agent = factory.new_agent(&reg, &mut rng).unwrap();
            assert!(agent.bandit_name().len() < 15);
            assert!(reg.net_path(agent.net_hash()).is_some());
            assert!(['n', 'e'].contains(&agent.policy_mode()));

            let (prefix, param) = agent.bandit_name().split_once('-').unwrap();
            let param: f64 = param.parse().unwrap();
            if BanditFamily::ALL
                .iter()
                .find(|f| f.prefix() == prefix)
                .unwrap()
                .uses_gamma()
            {
                assert!((0.029..=0.301).contains(&param), "gamma out of range: {}", param);
            } else {
                assert!((0.499..=2.001).contains(&param), "c out of range: {}", param);
            }
        }
    }

    #[test]
    fn test_new_agent_respects_enabled_sets() {
        let reg = registry_with_networks(2);
        let config = FactoryConfig::default()
            .with_families(vec![BanditFamily::Ucb])
            .with_policy_modes(vec!['e']);
        let factory = AgentFactory::new(config);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..50 {
            let agent = factory.new_agent(&reg, &mut rng).unwrap();
            assert!(agent.bandit_name().starts_with("ucb-"));
            assert_eq!(agent.policy_mode(), 'e');
        }
    }

    #[test]
    fn test_fill_reaches_target_with_fresh_stats() {
        let mut reg = registry_with_networks(4);
        let factory = AgentFactory::new(FactoryConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let added = factory.fill(&mut reg, 10, &mut rng).unwrap();
        assert_eq!(added, 10);
        assert_eq!(reg.population(), 10);
        for (id, arm) in reg.arms() {
            assert_eq!(arm.visits, 0);
            assert_eq!(arm.value, 0.0);
            assert_eq!(reg.ratings()[id], INITIAL_RATING);
        }

        // Filling to a target we already meet is a no-op.
        let added = factory.fill(&mut reg, 5, &mut rng).unwrap();
        assert_eq!(added, 0);
        assert_eq!(reg.population(), 10);
    }

    #[test]
    fn test_log_uniform_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..1000 {
            let x = sample_log_uniform(0.03, 0.3, &mut rng);
            assert!((0.03..=0.3).contains(&x));
        }
    }
}
