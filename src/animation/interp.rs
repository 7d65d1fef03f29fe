use crate::animation::ease::{Ease, ease_time};
use crate::foundation::core::Point;
use crate::foundation::error::{MorphError, MorphResult};
use crate::sampling::cloud::PointCloud;
use crate::store::archive::Transition;
use crate::transport::plan::TransportPlan;

/// Normalized time of step `time` in a transition of `frames` frames: `time / (frames - 1)`.
///
/// The first frame sits at `t = 0` and the last at `t = 1`. A single-frame transition stays at
/// `t = 0`.
pub fn transition_time(time: u32, frames: u32) -> f64 {
    if frames <= 1 {
        return 0.0;
    }
    (f64::from(time) / f64::from(frames - 1)).clamp(0.0, 1.0)
}

/// Positions of the morphing cloud at normalized time `t`.
///
/// Point `i` moves in a straight line from `source[i]` to the plan barycenter
/// `N * sum_j plan[i, j] * target[j]`. A row holding its full `1/N` mass in a single entry ends
/// on the matched target point itself, so for permutation plans `t = 0` reproduces `source` and
/// `t = 1` reproduces the permuted `target` bit for bit.
pub fn positions_at(
    source: &PointCloud,
    target: &PointCloud,
    plan: &TransportPlan,
    t: f64,
) -> MorphResult<PointCloud> {
    if plan.rows() != source.len() {
        return Err(MorphError::DimensionMismatch {
            left: source.len(),
            right: plan.rows(),
            transition: None,
        });
    }
    if plan.cols() != target.len() {
        return Err(MorphError::DimensionMismatch {
            left: plan.cols(),
            right: target.len(),
            transition: None,
        });
    }

    let t = t.clamp(0.0, 1.0);
    let scale = plan.rows() as f64;
    let targets = target.points();
    let mut out = Vec::with_capacity(source.len());
    for (i, &s) in source.points().iter().enumerate() {
        let end = barycenter(plan, i, targets, scale)?;
        out.push(Point::new(
            (1.0 - t) * s.x + t * end.x,
            (1.0 - t) * s.y + t * end.y,
        ));
    }
    Ok(PointCloud::new(out))
}

/// Tolerance on `N * mass` for treating a single-entry row as a full match.
const FULL_ROW_EPS: f64 = 1e-9;

fn barycenter(plan: &TransportPlan, i: usize, targets: &[Point], scale: f64) -> MorphResult<Point> {
    let mut row = plan.row(i);
    let Some((j0, v0)) = row.next() else {
        return Err(MorphError::validation(format!("plan row {i} holds no mass")));
    };
    let Some((j1, v1)) = row.next() else {
        let weight = v0 * scale;
        if (weight - 1.0).abs() <= FULL_ROW_EPS {
            return Ok(targets[j0]);
        }
        return Ok(Point::new(weight * targets[j0].x, weight * targets[j0].y));
    };

    let (mut x, mut y) = (0.0, 0.0);
    for (j, v) in [(j0, v0), (j1, v1)].into_iter().chain(row) {
        x += v * targets[j].x;
        y += v * targets[j].y;
    }
    Ok(Point::new(x * scale, y * scale))
}

/// Turns transition timesteps into point positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInterpolator {
    /// Speed modulation; `None` is linear.
    pub easing: Option<Ease>,
    /// Frames rendered for every transition.
    pub frames_per_transition: u32,
}

impl FrameInterpolator {
    /// Create an interpolator for transitions of `frames_per_transition` frames.
    pub fn new(easing: Option<Ease>, frames_per_transition: u32) -> MorphResult<Self> {
        if frames_per_transition == 0 {
            return Err(MorphError::validation(
                "interpolator needs at least one frame per transition",
            ));
        }
        Ok(Self {
            easing,
            frames_per_transition,
        })
    }

    /// Eased time of timestep `time`.
    pub fn time_at(&self, time: u32) -> f64 {
        ease_time(
            transition_time(time, self.frames_per_transition),
            self.easing,
        )
    }

    /// Cloud shown at timestep `time` of `transition`.
    pub fn frame(&self, transition: Transition<'_>, time: u32) -> MorphResult<PointCloud> {
        positions_at(
            transition.source,
            transition.target,
            transition.plan,
            self.time_at(time),
        )
        .map_err(|e| e.in_transition(transition.index))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/interp.rs"]
mod tests;
