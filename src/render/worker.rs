use crate::animation::interp::FrameInterpolator;
use crate::foundation::error::{MorphError, MorphResult};
use crate::render::frames::FrameDirectory;
use crate::render::partition::WorkPartition;
use crate::render::raster::ScatterRasterizer;
use crate::store::archive::Cycle;

/// One render worker: interpolates, rasterizes and writes the frames of its share.
#[derive(Debug)]
pub struct RenderWorker<'a> {
    /// Loaded, cycle-closed archive.
    pub cycle: &'a Cycle,
    /// Timestep to positions mapping.
    pub interp: FrameInterpolator,
    /// Frames owned by this worker.
    pub share: WorkPartition,
    /// Destination of the frames.
    pub frames: &'a FrameDirectory,
}

impl RenderWorker<'_> {
    /// Render every owned frame, then leave the completion marker. Returns the frame count.
    #[tracing::instrument(skip_all, fields(rank = self.share.rank(), workers = self.share.workers()))]
    pub fn run(&self, raster: &mut ScatterRasterizer) -> MorphResult<u64> {
        let layout = self.share.layout();
        if self.cycle.transitions() != layout.transitions as usize {
            return Err(MorphError::malformed_archive(format!(
                "archive holds {} transitions, configuration expects {}",
                self.cycle.transitions(),
                layout.transitions
            )));
        }

        let mut written = 0u64;
        for global in self.share.frames() {
            let Some(idx) = layout.locate(global) else {
                continue;
            };
            let transition = self
                .cycle
                .transition(idx.transition as usize)
                .ok_or_else(|| {
                    MorphError::malformed_archive(format!(
                        "transition {} missing from archive",
                        idx.transition
                    ))
                })?;
            let cloud = self.interp.frame(transition, idx.time)?;
            let frame = raster.render(&cloud)?;
            self.frames.write_frame(global, &frame)?;
            written += 1;
            tracing::trace!(global, transition = idx.transition, time = idx.time, "frame written");
        }

        self.frames.mark_worker_done(self.share.rank(), written)?;
        tracing::info!(frames = written, "worker finished");
        Ok(written)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/worker.rs"]
mod tests;
