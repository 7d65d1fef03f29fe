use super::*;

#[derive(Default)]
struct FakeSubmitter {
    next: JobId,
    fail_on: Option<Stage>,
    jobs: Vec<BatchJob>,
}

impl JobSubmitter for FakeSubmitter {
    fn submit(&mut self, job: &BatchJob) -> MorphResult<JobId> {
        if self.fail_on == Some(job.stage) {
            return Err(MorphError::Submission {
                stage: job.stage.subcommand().to_owned(),
                reason: "sbatch: error: invalid account".to_owned(),
            });
        }
        self.jobs.push(job.clone());
        self.next += 1;
        Ok(100 + self.next)
    }
}

fn opts() -> SlurmOptions {
    SlurmOptions {
        account: Some("xyz@cpu".to_owned()),
        qos: Some("qos_cpu-dev".to_owned()),
        modules: vec!["gcc/12".to_owned()],
        ntasks: 40,
        scatter_nodes: 2,
        scatter_cpus_per_task: 4,
        truncate_logs: false,
        ..SlurmOptions::default()
    }
}

fn directive<'a>(job: &'a BatchJob, key: &str) -> Option<&'a str> {
    job.directives
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[test]
fn stages_are_chained_with_afterok() {
    let mut fake = FakeSubmitter::default();
    let chain = launch(
        &opts(),
        Path::new("/opt/bin/otmorph"),
        Path::new("/work/morph.json"),
        &mut fake,
    )
    .unwrap();
    assert_eq!(
        chain,
        LaunchedChain {
            solve: 101,
            render: 102,
            assemble: 103
        }
    );

    let [solve, render, assemble] = &fake.jobs[..] else {
        panic!("expected three jobs, got {}", fake.jobs.len());
    };
    assert_eq!(directive(solve, "dependency"), None);
    assert_eq!(directive(render, "dependency"), Some("afterok:101"));
    assert_eq!(directive(assemble, "dependency"), Some("afterok:102"));
}

#[test]
fn stage_resources_follow_the_options() {
    let o = opts();
    let prog = Path::new("otmorph");
    let cfg = Path::new("morph.json");

    let solve = BatchJob::for_stage(&o, Stage::Solve, prog, cfg, None);
    assert_eq!(directive(&solve, "nodes"), Some("1"));
    assert_eq!(directive(&solve, "ntasks-per-node"), Some("1"));
    assert_eq!(directive(&solve, "cpus-per-task"), Some("40"));

    let render = BatchJob::for_stage(&o, Stage::Render, prog, cfg, Some(7));
    assert_eq!(directive(&render, "nodes"), Some("2"));
    assert_eq!(directive(&render, "ntasks-per-node"), Some("10"));
    assert_eq!(directive(&render, "cpus-per-task"), Some("4"));
    assert_eq!(render.command, vec!["otmorph", "render", "--config", "morph.json"]);

    let assemble = BatchJob::for_stage(&o, Stage::Assemble, prog, cfg, Some(8));
    assert_eq!(
        assemble.command,
        vec!["otmorph", "assemble", "--config", "morph.json", "--workers", "20"]
    );
}

#[test]
fn script_has_the_expected_shape() {
    let mut o = opts();
    o.extra
        .insert("mail_type".to_owned(), "FAIL".to_owned());
    let job = BatchJob::for_stage(
        &o,
        Stage::Render,
        Path::new("/opt/my tools/otmorph"),
        Path::new("/work/morph.json"),
        Some(42),
    );
    let script = job.script();
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines[0], "#!/bin/bash");
    assert!(lines.contains(&"#SBATCH --job-name=otmorph"));
    assert!(lines.contains(&"#SBATCH --account=xyz@cpu"));
    assert!(lines.contains(&"#SBATCH --mail-type=FAIL"));
    assert!(lines.contains(&"#SBATCH --dependency=afterok:42"));
    assert!(lines.contains(&"#SBATCH --open-mode=append"));
    assert!(lines.contains(&"#SBATCH --exclusive"));
    assert!(lines.contains(&"set -e"));
    assert!(lines.contains(&"cd ${SLURM_SUBMIT_DIR}"));
    assert!(lines.contains(&"module purge"));
    assert!(lines.contains(&"module load gcc/12"));
    assert!(lines.contains(&"srun '/opt/my tools/otmorph' render --config /work/morph.json"));

    let start = lines.iter().position(|l| l.contains("START TIME")).unwrap();
    let srun = lines.iter().position(|l| l.starts_with("srun ")).unwrap();
    let end = lines.iter().position(|l| l.contains("END TIME")).unwrap();
    assert!(start < srun && srun < end);
    // every directive precedes the first command
    let last_directive = lines.iter().rposition(|l| l.starts_with("#SBATCH")).unwrap();
    assert!(last_directive < lines.iter().position(|l| *l == "set -e").unwrap());
}

#[test]
fn no_modules_means_no_module_lines() {
    let mut o = opts();
    o.modules.clear();
    let script = BatchJob::for_stage(&o, Stage::Solve, Path::new("x"), Path::new("c.json"), None)
        .script();
    assert!(!script.contains("module"));
}

#[test]
fn failed_submission_stops_the_chain() {
    let mut fake = FakeSubmitter {
        fail_on: Some(Stage::Render),
        ..FakeSubmitter::default()
    };
    let err = launch(&opts(), Path::new("otmorph"), Path::new("c.json"), &mut fake).unwrap_err();
    assert!(err.to_string().contains("stage 'render'"));
    assert!(err.to_string().contains("invalid account"));
    assert_eq!(fake.jobs.len(), 1);
    assert_eq!(fake.jobs[0].stage, Stage::Solve);
}

#[test]
fn job_id_is_the_last_word() {
    assert_eq!(parse_job_id("Submitted batch job 4242\n"), Some(4242));
    assert_eq!(parse_job_id("Submitted batch job 17 on cluster x"), None);
    assert_eq!(parse_job_id(""), None);
}

#[test]
fn shell_quote_only_wraps_when_needed() {
    assert_eq!(shell_quote("/a/b-c_d.json"), "/a/b-c_d.json");
    assert_eq!(shell_quote("a b"), "'a b'");
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
    assert_eq!(shell_quote(""), "''");
}

#[test]
fn resource_settings_are_validated() {
    let mut o = opts();
    o.scatter_cpus_per_task = 80;
    assert!(o.validate().is_err());
    o.scatter_cpus_per_task = 0;
    assert!(o.validate().is_err());
    assert!(opts().validate().is_ok());
    assert_eq!(opts().render_workers(), 20);
}
