pub(crate) mod cloud;
pub(crate) mod intensity;
pub(crate) mod sampler;
