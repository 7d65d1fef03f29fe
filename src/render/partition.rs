use crate::foundation::core::FrameLayout;
use crate::foundation::error::{MorphError, MorphResult};

/// Frames owned by one render worker.
///
/// Worker `rank` out of `workers` renders every global index `g` with `g = rank (mod workers)`.
/// Over all ranks the shares are disjoint and cover `[0, total_frames)`; ranks beyond the frame
/// count simply get nothing to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkPartition {
    layout: FrameLayout,
    workers: u32,
    rank: u32,
}

impl WorkPartition {
    /// Share of worker `rank` among `workers`.
    pub fn new(layout: FrameLayout, workers: u32, rank: u32) -> MorphResult<Self> {
        if workers == 0 {
            return Err(MorphError::validation("worker count must be >= 1"));
        }
        if rank >= workers {
            return Err(MorphError::validation(format!(
                "worker rank {rank} out of range for {workers} workers"
            )));
        }
        Ok(Self {
            layout,
            workers,
            rank,
        })
    }

    /// Every share of a `workers`-way split, by rank.
    pub fn all(layout: FrameLayout, workers: u32) -> MorphResult<Vec<Self>> {
        (0..workers)
            .map(|rank| Self::new(layout, workers, rank))
            .collect()
    }

    /// Frame layout being split.
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// This worker's rank.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Total worker count.
    pub fn workers(&self) -> u32 {
        self.workers
    }

    /// Owned global indices in increasing order.
    pub fn frames(&self) -> impl Iterator<Item = u64> + use<> {
        (u64::from(self.rank)..self.layout.total_frames()).step_by(self.workers as usize)
    }

    /// Number of owned frames.
    pub fn len(&self) -> u64 {
        let total = self.layout.total_frames();
        let rank = u64::from(self.rank);
        if rank >= total {
            return 0;
        }
        (total - rank).div_ceil(u64::from(self.workers))
    }

    /// Return `true` when this worker owns no frame.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/partition.rs"]
mod tests;
