//! Agent identity - immutable value identifying one competitor configuration
//!
//! An agent is a `(network, bandit, policy mode)` triple: which network file
//! it plays with, which in-game exploration strategy it runs (e.g.
//! "exp3-0.123"), and which move-selection mode it samples from. Identities
//! are plain values; all mutable statistics live in the registry keyed by
//! them.

use serde::Serialize;

use crate::error::{LadderError, Result};

/// Reserved network hash meaning "no network": a baseline policy that plays
/// from raw Monte-Carlo rollouts instead of a learned evaluation.
pub const NO_NET_HASH: u64 = 0;

/// Path literal handed to the match runner for [`NO_NET_HASH`].
pub const NO_NET_PATH: &str = "mc";

/// Fixed width of the NUL-padded bandit-name field in wire records.
pub const NAME_FIELD_LEN: usize = 15;

/// Fixed width of an encoded identity: u64 hash + padded name + mode byte.
pub const ID_WIRE_LEN: usize = 8 + NAME_FIELD_LEN + 1;

/// Immutable identity of one competitor configuration.
///
/// Field order matters: the derived `Ord` is lexicographic over
/// `(net_hash, bandit_name, policy_mode)`, which is the total order used to
/// canonicalize unordered match pairs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AgentId {
    net_hash: u64,
    bandit_name: String,
    policy_mode: char,
}

impl AgentId {
    /// Create a validated identity.
    ///
    /// `bandit_name` must encode to fewer than [`NAME_FIELD_LEN`] bytes of
    /// ASCII (so the padded field always keeps at least one NUL);
    /// `policy_mode` must be a single ASCII character.
    pub fn new(net_hash: u64, bandit_name: impl Into<String>, policy_mode: char) -> Result<Self> {
        let bandit_name = bandit_name.into();

        if bandit_name.is_empty() || bandit_name.len() >= NAME_FIELD_LEN {
            return Err(LadderError::InvalidAgent(format!(
                "bandit name must be 1..{} bytes: {:?}",
                NAME_FIELD_LEN, bandit_name
            )));
        }
        if !bandit_name.is_ascii() || bandit_name.contains('\0') {
            return Err(LadderError::InvalidAgent(format!(
                "bandit name must be NUL-free ASCII: {:?}",
                bandit_name
            )));
        }
        if !policy_mode.is_ascii() || policy_mode == '\0' {
            return Err(LadderError::InvalidAgent(format!(
                "policy mode must be one ASCII character: {:?}",
                policy_mode
            )));
        }

        Ok(Self {
            net_hash,
            bandit_name,
            policy_mode,
        })
    }

    /// Hash of the network file this agent plays with (0 = no network)
    pub fn net_hash(&self) -> u64 {
        self.net_hash
    }

    /// Bandit algorithm name, e.g. "exp3-0.123"
    pub fn bandit_name(&self) -> &str {
        &self.bandit_name
    }

    /// Single-character move-selection mode
    pub fn policy_mode(&self) -> char {
        self.policy_mode
    }

    /// Encode as the fixed 24-byte wire form shared by all checkpoint files:
    /// little-endian hash, NUL-padded name, one mode byte.
    pub fn encode(&self) -> [u8; ID_WIRE_LEN] {
        let mut buf = [0u8; ID_WIRE_LEN];
        buf[..8].copy_from_slice(&self.net_hash.to_le_bytes());
        buf[8..8 + self.bandit_name.len()].copy_from_slice(self.bandit_name.as_bytes());
        buf[ID_WIRE_LEN - 1] = self.policy_mode as u8;
        buf
    }

    /// Decode the fixed 24-byte wire form, re-running field validation.
    pub fn decode(bytes: &[u8; ID_WIRE_LEN]) -> Result<Self> {
        let net_hash = u64::from_le_bytes(bytes[..8].try_into().expect("8-byte slice"));

        let name_field = &bytes[8..8 + NAME_FIELD_LEN];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
        let bandit_name = std::str::from_utf8(&name_field[..name_len])
            .map_err(|_| LadderError::InvalidAgent("bandit name is not UTF-8".to_string()))?
            .to_string();

        let policy_mode = bytes[ID_WIRE_LEN - 1] as char;

        Self::new(net_hash, bandit_name, policy_mode)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{:016x}",
            self.bandit_name, self.policy_mode, self.net_hash
        )
    }
}

/// Map an unordered pair of identities to its canonical `(lesser, greater)`
/// ordering, so a pairwise-results key is always stored in one direction.
pub fn canonical_pair(a: AgentId, b: AgentId) -> (AgentId, AgentId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
