use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;

use crate::foundation::error::{MorphError, MorphResult};

/// Scheduler settings used by `launch`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlurmOptions {
    /// `--job-name` of every stage.
    pub job_name: String,
    /// `--output` log, shared by the stages and appended to.
    pub output: String,
    /// `--error` log, shared by the stages and appended to.
    pub error: String,
    /// `--account` to charge.
    pub account: Option<String>,
    /// `--time` limit of every stage.
    pub time: Option<String>,
    /// `--qos` of every stage.
    pub qos: Option<String>,
    /// `--partition` of every stage.
    pub partition: Option<String>,
    /// Further `#SBATCH` options; underscores in keys become dashes.
    pub extra: BTreeMap<String, String>,
    /// Environment modules loaded after `module purge`. Empty skips module handling.
    pub modules: Vec<String>,
    /// CPUs given to the solve and assemble stages; also the CPU budget of the render stage.
    pub ntasks: u32,
    /// Nodes used by the render stage.
    pub scatter_nodes: u32,
    /// CPUs per render worker.
    pub scatter_cpus_per_task: u32,
    /// Empty the shared log files before submitting.
    pub truncate_logs: bool,
    /// Directory the batch scripts are written to before submission.
    pub script_dir: PathBuf,
    /// Keep the batch scripts after submission.
    pub keep_scripts: bool,
}

impl Default for SlurmOptions {
    fn default() -> Self {
        Self {
            job_name: "otmorph".to_owned(),
            output: "slurm.out".to_owned(),
            error: "slurm.err".to_owned(),
            account: None,
            time: Some("02:00:00".to_owned()),
            qos: None,
            partition: None,
            extra: BTreeMap::new(),
            modules: Vec::new(),
            ntasks: 40,
            scatter_nodes: 1,
            scatter_cpus_per_task: 1,
            truncate_logs: true,
            script_dir: PathBuf::from("."),
            keep_scripts: false,
        }
    }
}

impl SlurmOptions {
    /// Check the resource settings.
    pub fn validate(&self) -> MorphResult<()> {
        if self.ntasks == 0 || self.scatter_nodes == 0 || self.scatter_cpus_per_task == 0 {
            return Err(MorphError::validation(
                "cluster ntasks, scatter_nodes and scatter_cpus_per_task must be >= 1",
            ));
        }
        if self.scatter_cpus_per_task > self.ntasks {
            return Err(MorphError::validation(format!(
                "scatter_cpus_per_task ({}) exceeds ntasks ({})",
                self.scatter_cpus_per_task, self.ntasks
            )));
        }
        Ok(())
    }

    /// Render workers per node.
    pub fn render_tasks_per_node(&self) -> u32 {
        self.ntasks / self.scatter_cpus_per_task.max(1)
    }

    /// Total render workers.
    pub fn render_workers(&self) -> u32 {
        self.scatter_nodes * self.render_tasks_per_node()
    }

    fn common_directives(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("job-name".to_owned(), self.job_name.clone()),
            ("output".to_owned(), self.output.clone()),
            ("error".to_owned(), self.error.clone()),
        ];
        for (key, value) in [
            ("account", &self.account),
            ("time", &self.time),
            ("qos", &self.qos),
            ("partition", &self.partition),
        ] {
            if let Some(v) = value {
                out.push((key.to_owned(), v.clone()));
            }
        }
        for (k, v) in &self.extra {
            out.push((k.replace('_', "-"), v.clone()));
        }
        out
    }
}

/// Pipeline stage submitted as its own job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Sampling, solving and archive writing.
    Solve,
    /// Frame rendering by all workers.
    Render,
    /// Loop assembly.
    Assemble,
}

impl Stage {
    /// Subcommand running this stage.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Solve => "solve",
            Self::Render => "render",
            Self::Assemble => "assemble",
        }
    }
}

/// Scheduler job id.
pub type JobId = u64;

/// One batch script, ready for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchJob {
    /// Stage run by the job.
    pub stage: Stage,
    /// `#SBATCH` options in emission order, keys without the leading dashes.
    pub directives: Vec<(String, String)>,
    /// Environment modules to load.
    pub modules: Vec<String>,
    /// Command launched through `srun`.
    pub command: Vec<String>,
}

impl BatchJob {
    /// Job for `stage`, started only after `depends_on` succeeded.
    pub fn for_stage(
        opts: &SlurmOptions,
        stage: Stage,
        program: &Path,
        config: &Path,
        depends_on: Option<JobId>,
    ) -> Self {
        let mut directives = opts.common_directives();
        let (nodes, per_node, cpus) = match stage {
            Stage::Solve | Stage::Assemble => (1, 1, opts.ntasks),
            Stage::Render => (
                opts.scatter_nodes,
                opts.render_tasks_per_node(),
                opts.scatter_cpus_per_task,
            ),
        };
        directives.push(("nodes".to_owned(), nodes.to_string()));
        directives.push(("ntasks-per-node".to_owned(), per_node.to_string()));
        directives.push(("cpus-per-task".to_owned(), cpus.to_string()));
        if let Some(id) = depends_on {
            directives.push(("dependency".to_owned(), format!("afterok:{id}")));
        }

        let mut command = vec![
            program.display().to_string(),
            stage.subcommand().to_owned(),
            "--config".to_owned(),
            config.display().to_string(),
        ];
        if stage == Stage::Assemble {
            command.push("--workers".to_owned());
            command.push(opts.render_workers().to_string());
        }

        Self {
            stage,
            directives,
            modules: opts.modules.clone(),
            command,
        }
    }

    /// Render the batch script.
    pub fn script(&self) -> String {
        let mut s = String::from("#!/bin/bash\n\n");
        for (key, value) in &self.directives {
            s.push_str(&format!("#SBATCH --{key}={value}\n"));
        }
        // earlier stages share the log files
        s.push_str("#SBATCH --open-mode=append\n");
        s.push_str("#SBATCH --exclusive\n\n");
        s.push_str("set -e\n");
        s.push_str("cd ${SLURM_SUBMIT_DIR}\n");
        if !self.modules.is_empty() {
            s.push_str("module purge\n");
            for m in &self.modules {
                s.push_str(&format!("module load {}\n", shell_quote(m)));
            }
        }
        s.push_str("echo \"JOB $SLURM_JOBID START TIME: $(date)\"\n");
        let cmd: Vec<String> = self.command.iter().map(|a| shell_quote(a)).collect();
        s.push_str(&format!("srun {}\n", cmd.join(" ")));
        s.push_str("echo \"JOB $SLURM_JOBID END TIME: $(date)\"\n");
        s.push_str("echo \"-------------------\"\n");
        s.push_str("echo \"-------------------\" 1>&2;\n");
        s
    }
}

/// Quote `arg` for a POSIX shell unless it only holds safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if safe {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Hands batch jobs to a scheduler.
pub trait JobSubmitter {
    /// Submit `job` and return its id.
    fn submit(&mut self, job: &BatchJob) -> MorphResult<JobId>;
}

/// Submits through the `sbatch` command.
#[derive(Clone, Debug)]
pub struct SbatchSubmitter {
    script_dir: PathBuf,
    keep_scripts: bool,
}

impl SbatchSubmitter {
    /// Submitter writing its scripts under `script_dir`.
    pub fn new(script_dir: impl Into<PathBuf>, keep_scripts: bool) -> Self {
        Self {
            script_dir: script_dir.into(),
            keep_scripts,
        }
    }
}

impl JobSubmitter for SbatchSubmitter {
    fn submit(&mut self, job: &BatchJob) -> MorphResult<JobId> {
        let stage = job.stage.subcommand();
        std::fs::create_dir_all(&self.script_dir)
            .with_context(|| format!("create script directory '{}'", self.script_dir.display()))?;
        let path = self
            .script_dir
            .join(format!("otmorph-{stage}-{}.slurm", std::process::id()));
        std::fs::write(&path, job.script())
            .with_context(|| format!("write batch script '{}'", path.display()))?;

        let out = Command::new("sbatch").arg(&path).output();
        if !self.keep_scripts {
            let _ = std::fs::remove_file(&path);
        }
        let out = out.map_err(|e| MorphError::Submission {
            stage: stage.to_owned(),
            reason: format!("cannot run sbatch: {e}"),
        })?;
        if !out.status.success() {
            return Err(MorphError::Submission {
                stage: stage.to_owned(),
                reason: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        let id = parse_job_id(&stdout).ok_or_else(|| MorphError::Submission {
            stage: stage.to_owned(),
            reason: format!("unexpected sbatch output: {}", stdout.trim()),
        })?;
        tracing::info!(stage, job = id, "{}", stdout.trim());
        Ok(id)
    }
}

/// Job id in `sbatch` output such as `Submitted batch job 4242`.
pub fn parse_job_id(stdout: &str) -> Option<JobId> {
    stdout.split_whitespace().last()?.parse().ok()
}

/// Ids of a submitted stage chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchedChain {
    /// Solve job.
    pub solve: JobId,
    /// Render job, started after the solve job succeeded.
    pub render: JobId,
    /// Assemble job, started after the render job succeeded.
    pub assemble: JobId,
}

/// Submit the three stages, each depending on the success of the previous one.
///
/// A failed submission stops the chain; jobs already queued stay queued and their dependents
/// are never submitted.
#[tracing::instrument(skip_all, fields(config = %config.display()))]
pub fn launch(
    opts: &SlurmOptions,
    program: &Path,
    config: &Path,
    submitter: &mut dyn JobSubmitter,
) -> MorphResult<LaunchedChain> {
    opts.validate()?;
    if opts.truncate_logs {
        for log in [&opts.output, &opts.error] {
            std::fs::write(log, b"").with_context(|| format!("truncate log '{log}'"))?;
        }
    }

    let solve = submitter.submit(&BatchJob::for_stage(
        opts,
        Stage::Solve,
        program,
        config,
        None,
    ))?;
    let render = submitter.submit(&BatchJob::for_stage(
        opts,
        Stage::Render,
        program,
        config,
        Some(solve),
    ))?;
    let assemble = submitter.submit(&BatchJob::for_stage(
        opts,
        Stage::Assemble,
        program,
        config,
        Some(render),
    ))?;

    tracing::info!(solve, render, assemble, "stage chain submitted");
    Ok(LaunchedChain {
        solve,
        render,
        assemble,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/cluster/slurm.rs"]
mod tests;
