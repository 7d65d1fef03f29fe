//! otmorph turns a cycle of pictures into a looping animation in which each picture dissolves
//! into the next.
//!
//! Every picture becomes a cloud of points drawn from its ink density. Consecutive clouds are
//! matched by optimal transport (minimum total squared displacement), and every frame moves each
//! point a little further along a straight line towards its match. The work splits in three
//! stages that only share files:
//!
//! - [`solve_stage`]: sample the clouds, solve the plans, write the [`PlanStore`] archive
//! - [`render_stage`]: one call per worker rank, each writing its share of the frames
//! - [`assemble_stage`]: check the frame set and encode the loop
//!
//! [`run_all`] chains them in one process; [`launch`] submits them as dependent cluster jobs.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod animation;
pub(crate) mod cluster;
/// Animation sinks and loop assembly.
pub mod encode;
mod pipeline;
pub(crate) mod render;
pub(crate) mod sampling;
pub(crate) mod store;
pub(crate) mod transport;

pub use crate::foundation::config::{MorphConfig, SolverConfig};
pub use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameLayout, Point};
pub use crate::foundation::error::{MorphError, MorphResult};

pub use crate::animation::ease::{Ease, ease_time};
pub use crate::animation::interp::{FrameInterpolator, positions_at, transition_time};
pub use crate::cluster::slurm::{
    BatchJob, JobId, JobSubmitter, LaunchedChain, SbatchSubmitter, SlurmOptions, Stage, launch,
    parse_job_id,
};
pub use crate::encode::assemble::{LoopAssembler, OutputFormat, sink_for_path};
pub use crate::encode::gif::{GifSink, GifSinkOpts};
pub use crate::encode::mp4::{Mp4Sink, Mp4SinkOpts};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::pipeline::{
    SolvedCycle, assemble_stage, cleanup, render_all, render_stage, run_all, sample_cycle,
    solve_cycle, solve_stage,
};
pub use crate::render::frames::FrameDirectory;
pub use crate::render::partition::WorkPartition;
pub use crate::render::raster::{FrameRGBA, ScatterRasterizer, ScatterStyle};
pub use crate::render::worker::RenderWorker;
pub use crate::sampling::cloud::PointCloud;
pub use crate::sampling::intensity::{
    IntensityField, IntensityOpts, intensity_from_fn, intensity_from_image, load_intensity,
};
pub use crate::sampling::sampler::{PointCloudSampler, darkness_weights, picture_rng};
pub use crate::store::archive::{ARCHIVE_VERSION, Cycle, PlanStore, Transition, close_cycle};
pub use crate::transport::cost::{CostMatrix, DenseCost, SquaredEuclidean, squared_distance};
pub use crate::transport::plan::{CsrParts, TransportPlan};
pub use crate::transport::solver::{
    Assignment, AssignmentSolver, ShortestAugmentingPath, TransportSolver,
};
