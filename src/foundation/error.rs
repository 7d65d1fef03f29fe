/// Convenience result type used across otmorph.
pub type MorphResult<T> = Result<T, MorphError>;

/// Top-level error taxonomy used by every pipeline stage.
///
/// None of these are retried: each one either reflects malformed input or a deterministic
/// computational failure, so the owning stage aborts and dependent stages never start.
#[derive(thiserror::Error, Debug)]
pub enum MorphError {
    /// An image cannot be turned into a point cloud.
    #[error("invalid image '{image}': {reason}")]
    InvalidImage {
        /// Path or name of the offending image.
        image: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two point clouds (or a plan and a cloud) disagree on their point count.
    #[error("dimension mismatch{}: {left} points vs {right} points", transition_suffix(.transition))]
    DimensionMismatch {
        /// Size of the left-hand operand (source cloud, plan rows).
        left: usize,
        /// Size of the right-hand operand (target cloud, plan columns).
        right: usize,
        /// Transition index, when known.
        transition: Option<usize>,
    },

    /// The assignment solver hit its iteration cap before reaching optimality.
    #[error(
        "solver divergence{}: iteration cap {cap} exhausted after {iterations} iterations",
        transition_suffix(.transition)
    )]
    SolverDivergence {
        /// Iterations performed when the solve was abandoned.
        iterations: u64,
        /// Configured iteration cap.
        cap: u64,
        /// Transition index, when known.
        transition: Option<usize>,
    },

    /// The persisted archive violates the cloud/plan invariants.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The frame directory does not hold exactly the expected frame set.
    #[error("incomplete frame set: found {found} frames, expected {expected}{}", detail_suffix(.detail))]
    IncompleteFrameSet {
        /// Frame artifacts found.
        found: usize,
        /// Frame artifacts expected.
        expected: usize,
        /// Missing indices or worker ranks, when known.
        detail: Option<String>,
    },

    /// Invalid configuration or argument.
    #[error("validation error: {0}")]
    Validation(String),

    /// A cluster job could not be submitted.
    #[error("job submission failed for stage '{stage}': {reason}")]
    Submission {
        /// Pipeline stage of the job.
        stage: String,
        /// Scheduler output explaining the failure.
        reason: String,
    },

    /// Animation encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn transition_suffix(transition: &Option<usize>) -> String {
    match transition {
        Some(t) => format!(" in transition {t}"),
        None => String::new(),
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(" ({d})"),
        None => String::new(),
    }
}

impl MorphError {
    /// Build a [`MorphError::InvalidImage`] value.
    pub fn invalid_image(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`MorphError::MalformedArchive`] value.
    pub fn malformed_archive(msg: impl Into<String>) -> Self {
        Self::MalformedArchive(msg.into())
    }

    /// Build a [`MorphError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MorphError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`MorphError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Attach a transition index to solver-side errors that do not carry one yet.
    pub fn in_transition(self, index: usize) -> Self {
        match self {
            Self::DimensionMismatch {
                left,
                right,
                transition: None,
            } => Self::DimensionMismatch {
                left,
                right,
                transition: Some(index),
            },
            Self::SolverDivergence {
                iterations,
                cap,
                transition: None,
            } => Self::SolverDivergence {
                iterations,
                cap,
                transition: Some(index),
            },
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
