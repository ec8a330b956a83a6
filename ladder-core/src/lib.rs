//! LADDER Core - Bandit-driven matchmaking and rating state
//!
//! This crate provides the in-process state and math for a self-play
//! evaluation ladder:
//! - Agent identity (network hash + bandit name + policy mode)
//! - Registry of ratings, bandit statistics, pairwise results and networks
//! - UCB pair selection with virtual loss
//! - Elo and running-mean rating updates
//! - Random agent factory for population replenishment
//! - Crash-safe binary checkpointing
//!
//! Process orchestration (worker pool, subprocess match runner, population
//! churn loop) lives in `ladder-arena`.

pub mod agent;
pub mod config;
pub mod error;
pub mod factory;
pub mod persist;
pub mod rating;
pub mod registry;
pub mod select;

// Re-exports for convenient access
pub use agent::{canonical_pair, AgentId, NO_NET_HASH, NO_NET_PATH};
pub use config::LadderConfig;
pub use error::{LadderError, Result};
pub use factory::{AgentFactory, BanditFamily, FactoryConfig};
pub use rating::{apply_match, expected_score};
pub use registry::{ArmStats, Registry, WldCounts, INITIAL_RATING};
pub use select::{release_pair, select_pair};
