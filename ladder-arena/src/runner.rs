//! Match runner - external simulation process boundary
//!
//! The ladder never simulates games itself; it shells out to the match
//! executable with both sides' configurations and reads the aggregate
//! `wins losses draws` line the process prints last. Everything that can go
//! wrong here (spawn failure, crash, garbage output, timeout, shutdown) is a
//! recoverable [`MatchError`]; the worker pool drops the sample and moves on.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use ladder_core::registry::WldCounts;
use ladder_core::{AgentId, LadderConfig, Registry};

use crate::pool::ShutdownFlag;

/// Interval at which a running child is polled for exit/shutdown/timeout
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Time a stopped child gets to exit on SIGTERM before SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Errors from one match attempt. All recoverable at the round level.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("failed to spawn match runner '{exe}': {source}")]
    Spawn {
        exe: String,
        source: std::io::Error,
    },

    #[error("match runner exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("unparsable result line {line:?} (want 'wins losses draws')")]
    BadOutput { line: String },

    #[error("match exceeded the {0:?} time limit")]
    Timeout(Duration),

    #[error("match interrupted by shutdown")]
    Interrupted,

    #[error("failed to read match runner output: {0}")]
    Output(#[from] std::io::Error),
}

/// One side's share of the match command line
#[derive(Clone, Debug)]
pub struct SideSpec {
    pub net_path: PathBuf,
    pub bandit_name: String,
    pub policy_mode: char,
}

impl SideSpec {
    /// Resolve an agent's command-line form against the registry directory.
    /// Returns None when the agent's network hash has no entry, which is a
    /// registry invariant violation.
    pub fn for_agent(registry: &Registry, id: &AgentId) -> Option<SideSpec> {
        registry.net_path(id.net_hash()).map(|path| SideSpec {
            net_path: path.to_path_buf(),
            bandit_name: id.bandit_name().to_string(),
            policy_mode: id.policy_mode(),
        })
    }
}

/// Builds and supervises one simulation subprocess per scheduled match
#[derive(Clone, Debug)]
pub struct MatchRunner {
    exe: PathBuf,
    search_effort: u32,
    teams_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl MatchRunner {
    pub fn from_config(config: &LadderConfig) -> Self {
        Self {
            exe: config.runner_exe.clone(),
            search_effort: config.search_effort,
            teams_path: config.teams_path.clone(),
            timeout: config.match_timeout,
        }
    }

    /// Run one match between a canonical pair and parse its outcome,
    /// counted from the lesser side's perspective.
    pub fn run(
        &self,
        lesser: &SideSpec,
        greater: &SideSpec,
        shutdown: &ShutdownFlag,
    ) -> Result<WldCounts, MatchError> {
        let mut command = Command::new(&self.exe);
        command
            .arg(self.search_effort.to_string())
            .arg(&lesser.net_path)
            .arg(&lesser.bandit_name)
            .arg(lesser.policy_mode.to_string())
            .arg(&greater.net_path)
            .arg(&greater.bandit_name)
            .arg(greater.policy_mode.to_string());
        if let Some(teams) = &self.teams_path {
            command.arg(teams);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| MatchError::Spawn {
            exe: self.exe.display().to_string(),
            source,
        })?;

        // Drain both pipes on reader threads while the child runs. A chatty
        // runner would otherwise fill the pipe buffer, block on write, and
        // never exit.
        let stdout_drain = child.stdout.take().map(drain_pipe);
        let stderr_drain = child.stderr.take().map(drain_pipe);

        // Poll rather than block so shutdown and timeout can stop the child.
        let started = Instant::now();
        let status = loop {
            if shutdown.is_set() {
                terminate(&mut child);
                return Err(MatchError::Interrupted);
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    terminate(&mut child);
                    return Err(MatchError::Timeout(limit));
                }
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        if !status.success() {
            return Err(MatchError::Failed {
                code: status.code(),
                stderr: collect(stderr_drain).trim().to_string(),
            });
        }

        parse_outcome(&collect(stdout_drain))
    }
}

/// Read one child pipe to completion on its own thread.
fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

/// Join a drain thread; the child has exited (or been killed), so the pipe
/// is at EOF and this returns promptly.
fn collect(drain: Option<JoinHandle<String>>) -> String {
    drain
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Stop a running child: SIGTERM first so it can exit cleanly, escalating to
/// SIGKILL when the grace period runs out.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
    let deadline = Instant::now() + TERM_GRACE;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            _ if Instant::now() >= deadline => break,
            _ => std::thread::sleep(POLL_INTERVAL),
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Parse the final non-empty stdout line as exactly three non-negative
/// integers `wins losses draws`. Zero games total is also rejected; a match
/// that played nothing has no outcome to record.
fn parse_outcome(stdout: &str) -> Result<WldCounts, MatchError> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| MatchError::BadOutput {
            line: String::new(),
        })?;

    let bad = || MatchError::BadOutput {
        line: line.to_string(),
    };

    let mut fields = [0u32; 3];
    let mut tokens = line.split_whitespace();
    for field in &mut fields {
        *field = tokens.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    }
    if tokens.next().is_some() {
        return Err(bad());
    }

    let counts = WldCounts::new(fields[0], fields[1], fields[2]);
    if counts.total() == 0 {
        return Err(bad());
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_takes_last_nonempty_line() {
        let stdout = "loading nets\nplayed 4 games\n3 1 0\n\n";
        assert_eq!(parse_outcome(stdout).unwrap(), WldCounts::new(3, 1, 0));
    }

    #[test]
    fn test_parse_single_line() {
        assert_eq!(parse_outcome("0 0 2").unwrap(), WldCounts::new(0, 0, 2));
    }

    #[test]
    fn test_parse_rejects_wrong_token_count() {
        assert!(matches!(
            parse_outcome("1 2"),
            Err(MatchError::BadOutput { .. })
        ));
        assert!(matches!(
            parse_outcome("1 2 3 4"),
            Err(MatchError::BadOutput { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_integers() {
        for line in ["a b c", "1.5 0 0", "-1 1 0", "1 0 NaN"] {
            assert!(
                matches!(parse_outcome(line), Err(MatchError::BadOutput { .. })),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_parse_rejects_empty_output_and_zero_games() {
        assert!(matches!(
            parse_outcome(""),
            Err(MatchError::BadOutput { .. })
        ));
        assert!(matches!(
            parse_outcome("0 0 0"),
            Err(MatchError::BadOutput { .. })
        ));
    }

    #[test]
    fn test_side_spec_resolves_paths() {
        let mut registry = Registry::new();
        registry.add_network(5, "/nets/five.net");
        let learned = AgentId::new(5, "exp3-0.100", 'n').unwrap();
        let baseline = AgentId::new(0, "ucb-1.000", 'e').unwrap();
        let orphan = AgentId::new(9, "ucb-1.000", 'e').unwrap();

        let spec = SideSpec::for_agent(&registry, &learned).unwrap();
        assert_eq!(spec.net_path, PathBuf::from("/nets/five.net"));
        assert_eq!(spec.bandit_name, "exp3-0.100");
        assert_eq!(spec.policy_mode, 'n');

        assert_eq!(
            SideSpec::for_agent(&registry, &baseline).unwrap().net_path,
            PathBuf::from(ladder_core::NO_NET_PATH)
        );
        assert!(SideSpec::for_agent(&registry, &orphan).is_none());
    }
}
