//! Stage entry points.
//!
//! Every stage takes the full [`MorphConfig`] explicitly. The stages communicate only through the
//! archive and the frame directory, so they can run in one process or as separate cluster jobs.

use rayon::prelude::*;

use crate::animation::interp::FrameInterpolator;
use crate::encode::assemble::{LoopAssembler, sink_for_path};
use crate::foundation::config::MorphConfig;
use crate::foundation::core::Canvas;
use crate::foundation::error::{MorphError, MorphResult};
use crate::render::frames::FrameDirectory;
use crate::render::partition::WorkPartition;
use crate::render::raster::{ScatterRasterizer, ScatterStyle};
use crate::render::worker::RenderWorker;
use crate::sampling::cloud::PointCloud;
use crate::sampling::intensity::{IntensityOpts, load_intensity};
use crate::sampling::sampler::{PointCloudSampler, picture_rng};
use crate::store::archive::{Cycle, PlanStore};
use crate::transport::plan::TransportPlan;
use crate::transport::solver::{TransportSolver, build_thread_pool};

/// Output of the solve stage.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedCycle {
    /// Size of the density fields the clouds were drawn from.
    pub field: Canvas,
    /// One cloud per picture, in cycle order.
    pub clouds: Vec<PointCloud>,
    /// Stored plans: one for two pictures, otherwise one per transition.
    pub plans: Vec<TransportPlan>,
}

/// Sample one cloud per configured picture, in parallel.
///
/// All pictures must produce density fields of the same size, either natively or through
/// `size`.
#[tracing::instrument(skip_all, fields(pictures = cfg.pictures.len(), points = cfg.n_points))]
pub fn sample_cycle(cfg: &MorphConfig) -> MorphResult<(Canvas, Vec<PointCloud>)> {
    let sampler = PointCloudSampler::new(cfg.n_points, cfg.gamma)?;
    let opts = IntensityOpts {
        size: cfg.size,
        contrast_level: cfg.contrast_level,
    };
    let paths = cfg.picture_paths();

    let sampled = paths
        .par_iter()
        .enumerate()
        .map(|(i, path)| {
            let field = load_intensity(path, opts)?;
            let mut rng = picture_rng(cfg.seed, i);
            let cloud = sampler.sample(&field, &path.display().to_string(), &mut rng)?;
            Ok((field.size(), cloud))
        })
        .collect::<MorphResult<Vec<_>>>()?;

    let Some(&(field, _)) = sampled.first() else {
        return Err(MorphError::validation("no pictures configured"));
    };
    if let Some((i, (size, _))) = sampled.iter().enumerate().find(|(_, (s, _))| *s != field) {
        return Err(MorphError::invalid_image(
            paths[i].display().to_string(),
            format!(
                "density field is {}x{} but the first picture gives {}x{}; set `size` to resample",
                size.width, size.height, field.width, field.height
            ),
        ));
    }
    Ok((field, sampled.into_iter().map(|(_, c)| c).collect()))
}

/// Solve every transition of the closed cycle.
///
/// Two pictures need a single plan, the way back being its transpose. Otherwise plan `k` maps
/// cloud `k` onto cloud `(k + 1) mod K`.
pub fn solve_cycle(
    solver: &TransportSolver,
    clouds: &[PointCloud],
) -> MorphResult<Vec<TransportPlan>> {
    let k = clouds.len();
    if k < 2 {
        return Err(MorphError::validation(format!(
            "a cycle needs at least 2 pictures, got {k}"
        )));
    }
    let stored = if k == 2 { 1 } else { k };
    (0..stored)
        .map(|t| {
            tracing::info!(transition = t, of = stored, "solving transition");
            solver
                .solve(&clouds[t], &clouds[(t + 1) % k])
                .map_err(|e| e.in_transition(t))
        })
        .collect()
}

/// Sample, solve and persist. Clears the frame directory before the archive appears, so render
/// workers never see stale frames from an earlier run.
#[tracing::instrument(skip_all)]
pub fn solve_stage(cfg: &MorphConfig) -> MorphResult<SolvedCycle> {
    cfg.validate()?;
    let solver = TransportSolver::new(&cfg.solver)?;
    let (field, clouds) = sample_cycle(cfg)?;
    let plans = solve_cycle(&solver, &clouds)?;

    FrameDirectory::new(cfg.frame_dir_path()).prepare()?;
    PlanStore::new(cfg.archive_path()).save(field, &clouds, &plans)?;
    Ok(SolvedCycle {
        field,
        clouds,
        plans,
    })
}

fn rasterizer(cfg: &MorphConfig, cycle: &Cycle) -> MorphResult<ScatterRasterizer> {
    ScatterRasterizer::new(
        cfg.canvas,
        cycle.field,
        ScatterStyle {
            radius: cfg.point_radius(),
            ink_rgba: cfg.ink_rgba,
            paper_rgba: cfg.paper_rgba,
        },
    )
}

fn interpolator(cfg: &MorphConfig) -> MorphResult<FrameInterpolator> {
    FrameInterpolator::new(cfg.easing, cfg.frames_per_transition())
}

/// Render the share of worker `rank` out of `workers`. Returns the number of frames written.
#[tracing::instrument(skip(cfg))]
pub fn render_stage(cfg: &MorphConfig, rank: u32, workers: u32) -> MorphResult<u64> {
    cfg.validate()?;
    let cycle = PlanStore::new(cfg.archive_path()).load()?;
    let frames = FrameDirectory::new(cfg.frame_dir_path());
    let worker = RenderWorker {
        cycle: &cycle,
        interp: interpolator(cfg)?,
        share: WorkPartition::new(cfg.frame_layout()?, workers, rank)?,
        frames: &frames,
    };
    worker.run(&mut rasterizer(cfg, &cycle)?)
}

/// Render every share in this process, one rayon task per worker rank.
#[tracing::instrument(skip_all, fields(workers = cfg.workers))]
pub fn render_all(cfg: &MorphConfig) -> MorphResult<u64> {
    cfg.validate()?;
    let workers = u32::try_from(cfg.workers)
        .map_err(|_| MorphError::validation("too many workers"))?;
    let cycle = PlanStore::new(cfg.archive_path()).load()?;
    let frames = FrameDirectory::new(cfg.frame_dir_path());
    let interp = interpolator(cfg)?;
    let shares = WorkPartition::all(cfg.frame_layout()?, workers)?;

    let pool = build_thread_pool(Some(cfg.workers))?;
    let counts = pool.install(|| {
        shares
            .par_iter()
            .map(|&share| {
                let worker = RenderWorker {
                    cycle: &cycle,
                    interp,
                    share,
                    frames: &frames,
                };
                worker.run(&mut rasterizer(cfg, &cycle)?)
            })
            .collect::<MorphResult<Vec<u64>>>()
    })?;
    Ok(counts.into_iter().sum())
}

/// Verify the frame set and write the looping animation. With `workers` set, every worker's
/// completion marker is required too. Returns the number of frames in the animation.
#[tracing::instrument(skip_all, fields(output = %cfg.output_path().display()))]
pub fn assemble_stage(cfg: &MorphConfig, workers: Option<u32>) -> MorphResult<u64> {
    cfg.validate()?;
    let mut assembler = LoopAssembler::new(cfg.frame_layout()?, cfg.pause_frames());
    if let Some(w) = workers {
        assembler = assembler.expect_workers(w);
    }
    let frames = FrameDirectory::new(cfg.frame_dir_path());
    let mut sink = sink_for_path(&cfg.output_path(), cfg.paper_rgba)?;
    let written = assembler.assemble(&frames, cfg.fps, sink.as_mut())?;

    if cfg.cleanup_after {
        cleanup(cfg)?;
    }
    Ok(written)
}

/// Delete the archive and the frame directory.
pub fn cleanup(cfg: &MorphConfig) -> MorphResult<()> {
    PlanStore::new(cfg.archive_path()).remove()?;
    FrameDirectory::new(cfg.frame_dir_path()).remove()?;
    tracing::info!("intermediate files removed");
    Ok(())
}

/// Run solve, render and assemble in this process.
#[tracing::instrument(skip_all)]
pub fn run_all(cfg: &MorphConfig) -> MorphResult<u64> {
    solve_stage(cfg)?;
    render_all(cfg)?;
    let workers = u32::try_from(cfg.workers)
        .map_err(|_| MorphError::validation("too many workers"))?;
    assemble_stage(cfg, Some(workers))
}
