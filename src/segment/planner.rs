//! Deterministic partitioning of a resource into chunks.

use super::ByteRange;
use crate::error::{Error, Result};
use crate::resume::ResumeManifest;

use std::collections::BTreeSet;

/// Splits a resource into fixed-size [`ByteRange`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    chunk_size: u64,
    max_concurrency: usize,
}

impl ChunkPlanner {
    /// Create a planner. Both values must be non-zero.
    pub fn new(chunk_size: u64, max_concurrency: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be greater than zero".into()));
        }
        if max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "connection count must be greater than zero".into(),
            ));
        }
        Ok(Self {
            chunk_size,
            max_concurrency,
        })
    }

    /// Get the configured chunk size.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Partition `[0, total_size)`.
    ///
    /// Every range is `chunk_size` long except possibly the last one, so the
    /// same inputs always yield the same boundaries.
    pub fn plan(&self, total_size: u64) -> Result<ChunkPlan> {
        if total_size == 0 {
            return Err(Error::InvalidConfig("cannot plan an empty resource".into()));
        }

        let count = total_size.div_ceil(self.chunk_size);
        let ranges = (0..count)
            .map(|i| {
                let start = i * self.chunk_size;
                let end = start.saturating_add(self.chunk_size).min(total_size) - 1;
                ByteRange::new(start, end)
            })
            .collect();

        Ok(ChunkPlan {
            total_size,
            chunk_size: self.chunk_size,
            max_concurrency: self.max_concurrency,
            ranges,
        })
    }
}

/// The ordered chunks of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: u64,
    pub chunk_size: u64,
    max_concurrency: usize,
    pub ranges: Vec<ByteRange>,
}

impl ChunkPlan {
    /// Number of workers worth starting for this plan.
    pub fn worker_count(&self) -> usize {
        self.max_concurrency.min(self.ranges.len())
    }

    /// Check that a resume record was produced by an identical plan.
    pub fn accepts(&self, manifest: &ResumeManifest) -> Result<()> {
        let header = &manifest.header;
        if header.total_size != self.total_size {
            return Err(Error::ResumeStateInvalid(format!(
                "recorded size {} differs from {}",
                header.total_size, self.total_size
            )));
        }
        if header.chunk_size != self.chunk_size {
            return Err(Error::ResumeStateInvalid(format!(
                "recorded chunk size {} differs from {}",
                header.chunk_size, self.chunk_size
            )));
        }
        // Equal sizes imply equal boundaries unless the record was edited.
        if let Some(stray) = manifest
            .completed
            .iter()
            .find(|r| self.ranges.binary_search(r).is_err())
        {
            return Err(Error::ResumeStateInvalid(format!(
                "recorded range {stray} is not part of the plan"
            )));
        }
        Ok(())
    }

    /// Planned ranges not yet in `completed`, in plan order.
    pub fn remaining(&self, completed: &BTreeSet<ByteRange>) -> Vec<ByteRange> {
        self.ranges
            .iter()
            .filter(|r| !completed.contains(r))
            .copied()
            .collect()
    }
}
