pub(crate) mod cost;
pub(crate) mod plan;
pub(crate) mod solver;
