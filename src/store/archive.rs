use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::Canvas;
use crate::foundation::error::{MorphError, MorphResult};
use crate::foundation::fsio::replace_atomically;
use crate::sampling::cloud::PointCloud;
use crate::transport::plan::TransportPlan;

/// On-disk format version written by [`PlanStore::save`].
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct ArchiveFile {
    version: u32,
    point_count: usize,
    field: Canvas,
    clouds: Vec<PointCloud>,
    plans: Vec<TransportPlan>,
}

/// Closed cycle as seen by the render stage.
///
/// `clouds` holds `K + 1` entries (the first cloud repeated at the end) and `plans` holds `K`
/// entries, plan `k` moving `clouds[k]` onto `clouds[k + 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Cycle {
    /// Size of the density field the clouds were sampled from.
    pub field: Canvas,
    /// Cycle-closed clouds.
    pub clouds: Vec<PointCloud>,
    /// One plan per transition.
    pub plans: Vec<TransportPlan>,
}

/// One transition of a [`Cycle`].
#[derive(Clone, Copy, Debug)]
pub struct Transition<'a> {
    /// Transition index.
    pub index: usize,
    /// Cloud at `t = 0`.
    pub source: &'a PointCloud,
    /// Cloud at `t = 1`.
    pub target: &'a PointCloud,
    /// Correspondence between them.
    pub plan: &'a TransportPlan,
}

impl Cycle {
    /// Number of transitions (equal to the number of pictures).
    pub fn transitions(&self) -> usize {
        self.plans.len()
    }

    /// Borrow transition `k`.
    pub fn transition(&self, k: usize) -> Option<Transition<'_>> {
        Some(Transition {
            index: k,
            source: self.clouds.get(k)?,
            target: self.clouds.get(k + 1)?,
            plan: self.plans.get(k)?,
        })
    }
}

/// Close the cycle of `K` clouds.
///
/// With two pictures a single stored plan covers both directions: the reverse transition is its
/// transpose. Otherwise exactly `K` plans are required.
pub fn close_cycle(
    field: Canvas,
    mut clouds: Vec<PointCloud>,
    mut plans: Vec<TransportPlan>,
) -> MorphResult<Cycle> {
    check_counts(clouds.len(), plans.len())?;
    if clouds.len() == 2 && plans.len() == 1 {
        let reverse = plans[0].transpose();
        plans.push(reverse);
    }
    clouds.push(clouds[0].clone());

    for (k, plan) in plans.iter().enumerate() {
        let (rows, cols) = (clouds[k].len(), clouds[k + 1].len());
        if plan.rows() != rows || plan.cols() != cols {
            return Err(MorphError::malformed_archive(format!(
                "plan {k} is {}x{} but transition {k} moves {rows} points onto {cols} points",
                plan.rows(),
                plan.cols()
            )));
        }
    }
    Ok(Cycle {
        field,
        clouds,
        plans,
    })
}

/// Largest deviation of a row or column sum from `1/N` accepted in an archive.
const MARGINAL_EPS: f64 = 1e-9;

/// Every plan must move the uniform `1/N` mass of each point onto the uniform target mass.
fn check_marginals(plans: &[TransportPlan]) -> MorphResult<()> {
    match plans
        .iter()
        .position(|p| !p.is_mass_conserving(MARGINAL_EPS))
    {
        Some(k) => Err(MorphError::malformed_archive(format!(
            "plan {k} does not have uniform 1/N row and column sums"
        ))),
        None => Ok(()),
    }
}

fn check_counts(pictures: usize, plans: usize) -> MorphResult<()> {
    if pictures < 2 {
        return Err(MorphError::malformed_archive(format!(
            "a cycle needs at least 2 pictures, found {pictures}"
        )));
    }
    if plans == pictures || (pictures == 2 && plans == 1) {
        return Ok(());
    }
    Err(MorphError::malformed_archive(format!(
        "found {plans} plans for {pictures} pictures"
    )))
}

/// Single-file store shared between the solve stage and the render workers.
#[derive(Clone, Debug)]
pub struct PlanStore {
    path: PathBuf,
}

impl PlanStore {
    /// Store backed by the archive at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Archive location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the `K` clouds (not cycle-closed) and their plans.
    ///
    /// The archive is written to a temporary sibling and renamed into place, so a reader sees
    /// either the previous archive or the complete new one.
    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(
        &self,
        field: Canvas,
        clouds: &[PointCloud],
        plans: &[TransportPlan],
    ) -> MorphResult<()> {
        check_counts(clouds.len(), plans.len())?;
        let point_count = clouds[0].len();
        if let Some((k, c)) = clouds.iter().enumerate().find(|(_, c)| c.len() != point_count) {
            return Err(MorphError::DimensionMismatch {
                left: point_count,
                right: c.len(),
                transition: Some(k),
            });
        }
        if let Some((k, p)) = plans
            .iter()
            .enumerate()
            .find(|(_, p)| p.rows() != point_count || p.cols() != point_count)
        {
            return Err(MorphError::malformed_archive(format!(
                "plan {k} is {}x{} but every cloud holds {point_count} points",
                p.rows(),
                p.cols()
            )));
        }

        check_marginals(plans)?;

        let file = ArchiveFile {
            version: ARCHIVE_VERSION,
            point_count,
            field,
            clouds: clouds.to_vec(),
            plans: plans.to_vec(),
        };

        replace_atomically(&self.path, |w| {
            serde_json::to_writer(w, &file).context("serialize archive")
        })?;

        tracing::info!(
            pictures = clouds.len(),
            plans = plans.len(),
            points = point_count,
            "archive saved"
        );
        Ok(())
    }

    /// Load the archive and close the cycle.
    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> MorphResult<Cycle> {
        let f = File::open(&self.path).map_err(|e| {
            MorphError::malformed_archive(format!(
                "cannot open archive '{}': {e}",
                self.path.display()
            ))
        })?;
        let file: ArchiveFile = serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            MorphError::malformed_archive(format!(
                "cannot parse archive '{}': {e}",
                self.path.display()
            ))
        })?;
        if file.version != ARCHIVE_VERSION {
            return Err(MorphError::malformed_archive(format!(
                "archive version {} is not supported (expected {ARCHIVE_VERSION})",
                file.version
            )));
        }
        if let Some((k, c)) = file
            .clouds
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != file.point_count)
        {
            return Err(MorphError::malformed_archive(format!(
                "cloud {k} holds {} points, archive declares {}",
                c.len(),
                file.point_count
            )));
        }

        check_marginals(&file.plans)?;
        let cycle = close_cycle(file.field, file.clouds, file.plans)?;
        tracing::debug!(transitions = cycle.transitions(), "archive loaded");
        Ok(cycle)
    }

    /// Delete the archive. A missing archive is not an error.
    pub fn remove(&self) -> MorphResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("remove archive '{}'", self.path.display()))
                .into()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/store/archive.rs"]
mod tests;
