//! Memory statistics from `/proc/meminfo`
//!
//! Total memory is `MemTotal`. Available memory is `MemAvailable` on kernels
//! that report it (3.14 and later) and `MemFree + Buffers + Cached` on older
//! ones. Used memory is always `total - available`.

use crate::error::MemInfoError;
use crate::models::MemorySnapshot;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const DEFAULT_MEMINFO_PATH: &str = "/proc/meminfo";

const MEM_TOTAL: u16 = 1 << 0;
const MEM_FREE: u16 = 1 << 1;
const BUFFERS: u16 = 1 << 2;
const CACHED: u16 = 1 << 3;
const SHMEM: u16 = 1 << 4;
const SLAB: u16 = 1 << 5;
const SRECLAIMABLE: u16 = 1 << 6;
const SWAP_TOTAL: u16 = 1 << 7;
const SWAP_FREE: u16 = 1 << 8;

const ALL_TRACKED: u16 =
    MEM_TOTAL | MEM_FREE | BUFFERS | CACHED | SHMEM | SLAB | SRECLAIMABLE | SWAP_TOTAL | SWAP_FREE;

/// Line-by-line meminfo parser
///
/// Feed lines until [`feed_line`](Self::feed_line) reports completion (or the
/// input ends), then call [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct MemInfoAccumulator {
    snapshot: MemorySnapshot,
    seen: u16,
    has_available: bool,
}

impl MemInfoAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one `KEY: VALUE [unit]` line
    ///
    /// Returns `true` once every tracked key and `MemAvailable` have been
    /// seen, at which point the rest of the source can be skipped.
    pub fn feed_line(&mut self, line: &str) -> Result<bool, MemInfoError> {
        let mut fields = line.split(':');
        let (Some(key), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
            return Ok(self.is_complete());
        };

        let key = key.trim();
        let bytes = parse_bytes(key, value.trim())?;

        let flag = match key {
            "MemAvailable" => {
                self.snapshot.available = bytes;
                self.has_available = true;
                0
            }
            "MemTotal" => {
                self.snapshot.total = bytes;
                MEM_TOTAL
            }
            "MemFree" => {
                self.snapshot.free = bytes;
                MEM_FREE
            }
            "Buffers" => {
                self.snapshot.buffers = bytes;
                BUFFERS
            }
            "Cached" => {
                self.snapshot.cached = bytes;
                CACHED
            }
            "Shmem" => {
                self.snapshot.shared = bytes;
                SHMEM
            }
            "Slab" => {
                self.snapshot.slab = bytes;
                SLAB
            }
            "SReclaimable" => {
                self.snapshot.reclaimable = bytes;
                SRECLAIMABLE
            }
            "SwapTotal" => {
                self.snapshot.swap_total = bytes;
                SWAP_TOTAL
            }
            "SwapFree" => {
                self.snapshot.swap_free = bytes;
                SWAP_FREE
            }
            _ => 0,
        };
        self.seen |= flag;

        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.seen == ALL_TRACKED && self.has_available
    }

    /// Whether the source reported `MemAvailable` directly
    pub fn has_available(&self) -> bool {
        self.has_available
    }

    /// Derive available, used and swap-used memory
    pub fn finish(self) -> MemorySnapshot {
        let mut snapshot = self.snapshot;
        if !self.has_available {
            // Pre-3.14 kernels
            snapshot.available = snapshot
                .free
                .saturating_add(snapshot.buffers)
                .saturating_add(snapshot.cached);
        }
        snapshot.used = snapshot.total.saturating_sub(snapshot.available);
        snapshot.swap_used = snapshot.swap_total.saturating_sub(snapshot.swap_free);
        snapshot
    }
}

/// Parse a meminfo value into bytes; bare numbers are kibibytes
fn parse_bytes(key: &str, raw: &str) -> Result<u64, MemInfoError> {
    let invalid = |reason: String| MemInfoError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
        reason,
    };

    let mut tokens = raw.split_whitespace();
    let number = tokens.next().ok_or_else(|| invalid("empty value".to_string()))?;
    let unit = tokens.next();
    if tokens.next().is_some() {
        return Err(invalid("unexpected trailing text".to_string()));
    }

    let amount: u64 = number.parse().map_err(|e| invalid(format!("{}", e)))?;
    let multiplier = match unit {
        None | Some("kB") | Some("KiB") => 1024,
        Some("B") => 1,
        Some(other) => return Err(invalid(format!("unknown unit {}", other))),
    };

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("byte count overflows u64".to_string()))
}

/// Parse meminfo content already held in memory
pub fn parse_meminfo(content: &str) -> Result<MemorySnapshot, MemInfoError> {
    let mut acc = MemInfoAccumulator::new();
    for line in content.lines() {
        if acc.feed_line(line)? {
            break;
        }
    }
    Ok(acc.finish())
}

/// Reads a meminfo source from the filesystem
#[derive(Debug, Clone)]
pub struct MemInfoReader {
    path: PathBuf,
}

impl Default for MemInfoReader {
    fn default() -> Self {
        Self::new(DEFAULT_MEMINFO_PATH)
    }
}

impl MemInfoReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and derive a snapshot, stopping as soon as everything is known
    pub async fn read(&self) -> Result<MemorySnapshot, MemInfoError> {
        let unavailable = |source| MemInfoError::SourceUnavailable {
            path: self.path.clone(),
            source,
        };

        let file = File::open(&self.path).await.map_err(unavailable)?;
        let mut lines = BufReader::new(file).lines();
        let mut acc = MemInfoAccumulator::new();

        while let Some(line) = lines.next_line().await.map_err(unavailable)? {
            if acc.feed_line(&line)? {
                break;
            }
        }

        Ok(acc.finish())
    }
}
