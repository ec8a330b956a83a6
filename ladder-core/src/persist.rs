//! Checkpoint persistence - binary encode/decode of registry state
//!
//! Four files in the working directory, each a flat sequence of fixed-size
//! little-endian records (the directory file uses NUL-terminated paths
//! instead). Every checkpoint rewrites each file wholesale through a
//! write-to-temp-then-rename cycle, so a crash mid-write leaves the previous
//! checkpoint intact and a restart never sees a half-written file.
//!
//! Record layouts (identity wire form is shared with [`crate::agent`]):
//!
//! - `ratings`:   { AgentId (24), f32 rating }                    = 28 bytes
//! - `ucb`:       { AgentId (24), f32 value, u32 visits }         = 32 bytes
//! - `results`:   { AgentId lesser, AgentId greater, u32 w/l/d }  = 60 bytes
//! - `directory`: { u64 hash, NUL-terminated UTF-8 path }

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::agent::{AgentId, ID_WIRE_LEN};
use crate::error::{LadderError, Result};
use crate::registry::{ArmStats, Registry, WldCounts};

pub const RATINGS_FILE: &str = "ratings";
pub const UCB_FILE: &str = "ucb";
pub const RESULTS_FILE: &str = "results";
pub const DIRECTORY_FILE: &str = "directory";

const RATING_RECORD: usize = ID_WIRE_LEN + 4;
const UCB_RECORD: usize = ID_WIRE_LEN + 4 + 4;
const RESULT_RECORD: usize = 2 * ID_WIRE_LEN + 12;

/// Write all four checkpoint files, atomically replacing any previous
/// checkpoint in `dir`.
pub fn save(registry: &Registry, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;

    write_atomic(dir, RATINGS_FILE, &encode_ratings(registry)?)?;
    write_atomic(dir, UCB_FILE, &encode_arms(registry)?)?;
    write_atomic(dir, RESULTS_FILE, &encode_results(registry)?)?;
    write_atomic(dir, DIRECTORY_FILE, &encode_directory(registry)?)?;

    Ok(())
}

/// Load a registry from a checkpoint directory.
///
/// Returns `Ok(None)` when no ratings file exists (fresh start). A present
/// but undecodable file is an error; startup decides whether that is fatal.
pub fn load(dir: &Path) -> Result<Option<Registry>> {
    let ratings_path = dir.join(RATINGS_FILE);
    if !ratings_path.exists() {
        return Ok(None);
    }

    let mut registry = Registry::new();

    decode_ratings(&fs::read(&ratings_path)?, &mut registry)?;

    let ucb_path = dir.join(UCB_FILE);
    if ucb_path.exists() {
        decode_arms(&fs::read(&ucb_path)?, &mut registry)?;
    }

    let results_path = dir.join(RESULTS_FILE);
    if results_path.exists() {
        decode_results(&fs::read(&results_path)?, &mut registry)?;
    }

    let directory_path = dir.join(DIRECTORY_FILE);
    if directory_path.exists() {
        decode_directory(&fs::read(&directory_path)?, &mut registry)?;
    }

    Ok(Some(registry))
}

/// Write `bytes` to `dir/name` through a temp-file sibling and rename
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let tmp: PathBuf = dir.join(format!("{}.tmp", name));
    let dest = dir.join(name);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, &dest)?;
    Ok(())
}

fn malformed(file: &str, detail: impl Into<String>) -> LadderError {
    LadderError::MalformedRecord {
        file: file.to_string(),
        detail: detail.into(),
    }
}

// ============================================================================
// Fixed-size record files
// ============================================================================

fn encode_ratings(registry: &Registry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(registry.ratings.len() * RATING_RECORD);
    for (id, rating) in &registry.ratings {
        buf.write_all(&id.encode())?;
        buf.write_f32::<LittleEndian>(*rating)?;
    }
    Ok(buf)
}

fn decode_ratings(bytes: &[u8], registry: &mut Registry) -> Result<()> {
    let chunks = exact_chunks(bytes, RATING_RECORD, RATINGS_FILE)?;
    for chunk in chunks {
        let id = decode_id(&chunk[..ID_WIRE_LEN], RATINGS_FILE)?;
        let rating = (&chunk[ID_WIRE_LEN..]).read_f32::<LittleEndian>()?;
        registry.ratings.insert(id.clone(), rating);
        // Arms default to zero until the ucb file (if any) overwrites them.
        registry.arms.insert(id, ArmStats::default());
    }
    Ok(())
}

fn encode_arms(registry: &Registry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(registry.arms.len() * UCB_RECORD);
    for (id, arm) in &registry.arms {
        buf.write_all(&id.encode())?;
        buf.write_f32::<LittleEndian>(arm.value)?;
        buf.write_u32::<LittleEndian>(arm.visits)?;
    }
    Ok(buf)
}

fn decode_arms(bytes: &[u8], registry: &mut Registry) -> Result<()> {
    let chunks = exact_chunks(bytes, UCB_RECORD, UCB_FILE)?;
    for chunk in chunks {
        let id = decode_id(&chunk[..ID_WIRE_LEN], UCB_FILE)?;
        let mut rest = &chunk[ID_WIRE_LEN..];
        let value = rest.read_f32::<LittleEndian>()?;
        let visits = rest.read_u32::<LittleEndian>()?;
        registry.arms.insert(id, ArmStats { value, visits });
    }
    Ok(())
}

fn encode_results(registry: &Registry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(registry.results.len() * RESULT_RECORD);
    for ((lesser, greater), counts) in &registry.results {
        buf.write_all(&lesser.encode())?;
        buf.write_all(&greater.encode())?;
        buf.write_u32::<LittleEndian>(counts.wins)?;
        buf.write_u32::<LittleEndian>(counts.losses)?;
        buf.write_u32::<LittleEndian>(counts.draws)?;
    }
    Ok(buf)
}

fn decode_results(bytes: &[u8], registry: &mut Registry) -> Result<()> {
    let chunks = exact_chunks(bytes, RESULT_RECORD, RESULTS_FILE)?;
    for chunk in chunks {
        let lesser = decode_id(&chunk[..ID_WIRE_LEN], RESULTS_FILE)?;
        let greater = decode_id(&chunk[ID_WIRE_LEN..2 * ID_WIRE_LEN], RESULTS_FILE)?;
        if lesser > greater {
            return Err(malformed(
                RESULTS_FILE,
                format!("non-canonical pair {} / {}", lesser, greater),
            ));
        }
        let mut rest = &chunk[2 * ID_WIRE_LEN..];
        let counts = WldCounts::new(
            rest.read_u32::<LittleEndian>()?,
            rest.read_u32::<LittleEndian>()?,
            rest.read_u32::<LittleEndian>()?,
        );
        registry.results.insert((lesser, greater), counts);
    }
    Ok(())
}

// ============================================================================
// Variable-size directory file
// ============================================================================

fn encode_directory(registry: &Registry) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for (hash, path) in &registry.directory {
        let path = path.to_str().ok_or_else(|| {
            malformed(DIRECTORY_FILE, format!("non-UTF-8 path for {:#x}", hash))
        })?;
        buf.write_u64::<LittleEndian>(*hash)?;
        buf.write_all(path.as_bytes())?;
        buf.push(0);
    }
    Ok(buf)
}

fn decode_directory(bytes: &[u8], registry: &mut Registry) -> Result<()> {
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest.len() < 8 {
            return Err(malformed(DIRECTORY_FILE, "truncated hash field"));
        }
        let hash = rest.read_u64::<LittleEndian>()?;

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed(DIRECTORY_FILE, "unterminated path"))?;
        let path = std::str::from_utf8(&rest[..nul])
            .map_err(|_| malformed(DIRECTORY_FILE, "non-UTF-8 path"))?;
        registry.directory.insert(hash, PathBuf::from(path));

        rest = &rest[nul + 1..];
    }
    Ok(())
}

// ============================================================================
// Shared helpers
// ============================================================================

fn exact_chunks<'a>(
    bytes: &'a [u8],
    record_len: usize,
    file: &str,
) -> Result<std::slice::ChunksExact<'a, u8>> {
    if bytes.len() % record_len != 0 {
        return Err(malformed(
            file,
            format!(
                "{} bytes is not a multiple of the {}-byte record",
                bytes.len(),
                record_len
            ),
        ));
    }
    Ok(bytes.chunks_exact(record_len))
}

fn decode_id(bytes: &[u8], file: &str) -> Result<AgentId> {
    let fixed: &[u8; ID_WIRE_LEN] = bytes
        .try_into()
        .map_err(|_| malformed(file, "short identity field"))?;
    AgentId::decode(fixed).map_err(|e| malformed(file, e.to_string()))
}
