//! LADDER Arena - process orchestration for the evaluation ladder
//!
//! `ladder-core` holds the state and the math; this crate makes matches
//! actually happen:
//! - [`runner`]: spawns and supervises the external match executable
//! - [`pool`]: fans rounds of matches across worker threads with virtual
//!   loss keeping concurrent selections apart
//! - [`population`]: the outer loop of rounds, checkpoints, and churn

pub mod pool;
pub mod population;
pub mod runner;

pub use pool::{run_round, RoundSummary, ShutdownFlag};
pub use population::{retire_and_refill, standings_of, Ladder, Standing};
pub use runner::{MatchError, MatchRunner, SideSpec};
