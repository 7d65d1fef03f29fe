use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "otmorph", version, about = "Looping optimal-transport morphs between pictures")]
struct Cli {
    /// More logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the pictures, solve the transport plans and write the archive.
    Solve(ConfigArgs),
    /// Render the frames of one worker.
    Render(RenderArgs),
    /// Check the frame set and write the looping animation.
    Assemble(AssembleArgs),
    /// Run every stage in this process.
    Run(ConfigArgs),
    /// Submit the stages as chained Slurm jobs.
    Launch(LaunchArgs),
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Configuration JSON.
    #[arg(long, short = 'c')]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    cfg: ConfigArgs,

    /// Rank of this worker.
    #[arg(long, env = "SLURM_PROCID", default_value_t = 0)]
    rank: u32,

    /// Total number of workers; defaults to `workers` from the configuration.
    #[arg(long, env = "SLURM_NTASKS")]
    workers: Option<u32>,
}

#[derive(Parser, Debug)]
struct AssembleArgs {
    #[command(flatten)]
    cfg: ConfigArgs,

    /// Also require a completion marker from each of this many workers.
    #[arg(long)]
    workers: Option<u32>,
}

#[derive(Parser, Debug)]
struct LaunchArgs {
    #[command(flatten)]
    cfg: ConfigArgs,

    /// Print the batch scripts instead of submitting them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Solve(args) => cmd_solve(args),
        Command::Render(args) => cmd_render(args),
        Command::Assemble(args) => cmd_assemble(args),
        Command::Run(args) => cmd_run(args),
        Command::Launch(args) => cmd_launch(args),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_config(path: &Path) -> anyhow::Result<otmorph::MorphConfig> {
    let cfg = otmorph::MorphConfig::from_path(path)
        .with_context(|| format!("load configuration '{}'", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_solve(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    let solved = otmorph::solve_stage(&cfg)?;
    eprintln!(
        "wrote {} ({} pictures, {} plans)",
        cfg.archive_path().display(),
        solved.clouds.len(),
        solved.plans.len()
    );
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.cfg.config)?;
    let workers = match args.workers {
        Some(w) => w,
        None => u32::try_from(cfg.workers).context("workers does not fit in u32")?,
    };
    let frames = otmorph::render_stage(&cfg, args.rank, workers)?;
    eprintln!(
        "worker {}/{} wrote {frames} frames to {}",
        args.rank,
        workers,
        cfg.frame_dir_path().display()
    );
    Ok(())
}

fn cmd_assemble(args: AssembleArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.cfg.config)?;
    let frames = otmorph::assemble_stage(&cfg, args.workers)?;
    eprintln!("wrote {} ({frames} frames)", cfg.output_path().display());
    Ok(())
}

fn cmd_run(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.config)?;
    let frames = otmorph::run_all(&cfg)?;
    eprintln!("wrote {} ({frames} frames)", cfg.output_path().display());
    Ok(())
}

fn cmd_launch(args: LaunchArgs) -> anyhow::Result<()> {
    let cfg = read_config(&args.cfg.config)?;
    let opts = cfg.cluster.clone().unwrap_or_default();
    let config = std::fs::canonicalize(&args.cfg.config)
        .with_context(|| format!("resolve '{}'", args.cfg.config.display()))?;
    let program = std::env::current_exe().context("locate the otmorph executable")?;

    let chain = if args.dry_run {
        let opts = otmorph::SlurmOptions {
            truncate_logs: false,
            ..opts
        };
        otmorph::launch(&opts, &program, &config, &mut PrintSubmitter::default())?
    } else {
        let mut submitter = otmorph::SbatchSubmitter::new(
            cfg.resolve(&opts.script_dir),
            opts.keep_scripts,
        );
        otmorph::launch(&opts, &program, &config, &mut submitter)?
    };
    eprintln!(
        "{} solve={} render={} assemble={}",
        if args.dry_run { "dry run" } else { "submitted" },
        chain.solve,
        chain.render,
        chain.assemble
    );
    Ok(())
}

/// Prints scripts to stdout and hands out placeholder ids.
#[derive(Default)]
struct PrintSubmitter {
    next: otmorph::JobId,
}

impl otmorph::JobSubmitter for PrintSubmitter {
    fn submit(&mut self, job: &otmorph::BatchJob) -> otmorph::MorphResult<otmorph::JobId> {
        self.next += 1;
        println!("# --- {} (job {}) ---", job.stage.subcommand(), self.next);
        print!("{}", job.script());
        Ok(self.next)
    }
}
