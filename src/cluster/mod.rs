pub(crate) mod slurm;
