pub(crate) mod frames;
pub(crate) mod partition;
pub(crate) mod raster;
pub(crate) mod worker;
