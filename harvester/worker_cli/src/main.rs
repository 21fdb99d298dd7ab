use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use harvester_control::{
    config::StepParams, store::record_key, target::read_bounds, AdaptiveController,
    ControlTelemetry, ControllerConfig, ControllerMetrics, FileTuningStore, SimulatedTarget,
    SimulationProfile, TargetBounds, TuningStore, WeightTuning,
};
use rand::{rngs::SmallRng, SeedableRng};
use shared_event_bus::{EventPublisher, FileEventPublisher};
use shared_logging::LogLevel;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "harvest-worker", version, about = "Adaptive weaken/grow/extract workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs one or more workers against a simulated target.
    Run(RunArgs),
    /// Checks the flags and step profile, then exits.
    Validate(RunArgs),
    /// Prints the stored weight record for a target.
    Inspect {
        /// Target whose record is printed.
        #[arg(long, visible_alias = "target")]
        host: String,
        #[arg(long = "store-dir", visible_alias = "store_dir", default_value = "harvester/tuning")]
        store_dir: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Threshold,
    Weighted,
}

#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Target identifier.
    #[arg(long, visible_alias = "target", default_value = "")]
    host: String,
    #[arg(long, value_enum, default_value_t = StrategyArg::Threshold)]
    strategy: StrategyArg,
    #[arg(long = "grow-threshold", visible_alias = "grow_threshold", default_value_t = 0.0)]
    grow_threshold: f64,
    #[arg(long = "weaken-threshold", visible_alias = "weaken_threshold", default_value_t = 0.0)]
    weaken_threshold: f64,
    #[arg(long = "hack-threshold", visible_alias = "hack_threshold", default_value_t = 0.0)]
    hack_threshold: f64,
    /// Worker count system-wide; defaults to `--workers`.
    #[arg(long = "total-threads", visible_alias = "total_threads")]
    total_threads: Option<u32>,
    /// Defaults to the simulated target's cap.
    #[arg(long = "max-money", visible_alias = "max_money")]
    max_money: Option<f64>,
    /// Defaults to the simulated target's floor.
    #[arg(long = "min-security", visible_alias = "min_security")]
    min_security: Option<f64>,
    /// Fixed extraction chance; -1 reads it live from the target.
    #[arg(
        long = "hack-chance",
        visible_alias = "hack_chance",
        default_value_t = -1.0,
        allow_negative_numbers = true
    )]
    hack_chance: f64,
    /// Ignore the stored weight record at startup.
    #[arg(long = "clean-chance", visible_alias = "clean_chance")]
    clean_chance: bool,
    #[arg(long, default_value_t = 1)]
    workers: u32,
    /// Stop after this many iterations per worker; runs forever when absent.
    #[arg(long)]
    iterations: Option<u64>,
    #[arg(long = "store-dir", visible_alias = "store_dir", default_value = "harvester/tuning")]
    store_dir: PathBuf,
    /// TOML step profile (`defense_step`, `yield_step`, `drift_factor`, `drift_cooldown_ms`).
    #[arg(long)]
    profile: Option<PathBuf>,
    /// TOML profile of the simulated target.
    #[arg(long = "target-profile")]
    target_profile: Option<PathBuf>,
    #[arg(long = "log-path")]
    log_path: Option<PathBuf>,
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
    #[arg(long = "event-log")]
    event_log: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn extraction_chance(&self) -> Option<f64> {
        ((self.hack_chance + 1.0).abs() > f64::EPSILON).then_some(self.hack_chance)
    }

    fn step_params(&self) -> Result<StepParams> {
        match &self.profile {
            Some(path) => Ok(StepParams::load(path)?),
            None => Ok(StepParams::default()),
        }
    }

    fn simulation_profile(&self) -> Result<SimulationProfile> {
        match &self.target_profile {
            Some(path) => load_simulation_profile(path),
            None => Ok(SimulationProfile::default()),
        }
    }

    fn controller_config(&self, bounds: TargetBounds) -> Result<ControllerConfig> {
        let mut builder = ControllerConfig::builder(self.host.clone())
            .total_threads(self.total_threads.unwrap_or(self.workers))
            .max_yield(self.max_money.unwrap_or(bounds.max_yield))
            .min_defense(self.min_security.unwrap_or(bounds.min_defense))
            .clean_start(self.clean_chance)
            .steps(self.step_params()?);
        builder = match self.strategy {
            StrategyArg::Threshold => {
                let builder = builder.threshold(
                    self.weaken_threshold,
                    self.grow_threshold,
                    self.hack_threshold,
                );
                match self.extraction_chance() {
                    Some(chance) => builder.extraction_chance(chance),
                    None => builder,
                }
            }
            StrategyArg::Weighted => builder.weighted(),
        };
        Ok(builder.build()?)
    }

    /// Builds the simulated target and a config whose absent bounds are read from it.
    async fn prepare(&self, seed: u64) -> Result<(Arc<SimulatedTarget>, ControllerConfig)> {
        let target = Arc::new(SimulatedTarget::new(
            &self.host,
            self.simulation_profile()?,
            seed,
        ));
        let bounds = read_bounds(target.as_ref(), &self.host).await?;
        let config = self.controller_config(bounds)?;
        Ok((target, config))
    }
}

fn load_simulation_profile(path: &Path) -> Result<SimulationProfile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading target profile {}", path.display()))?;
    let profile: SimulationProfile = toml::from_str(&raw)
        .with_context(|| format!("parsing target profile {}", path.display()))?;
    profile
        .validate()
        .with_context(|| format!("invalid target profile {}", path.display()))?;
    Ok(profile)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Validate(args) => {
            let (_, config) = args.prepare(args.seed.unwrap_or_default()).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Inspect { host, store_dir } => handle_inspect(&host, &store_dir).await,
    }
}

async fn handle_run(args: RunArgs) -> Result<()> {
    let seed = args.seed.unwrap_or_else(rand::random);
    let (target, config) = args.prepare(seed).await?;
    let level: LogLevel = args.log_level.parse()?;

    let store: Arc<dyn TuningStore> = Arc::new(FileTuningStore::new(&args.store_dir)?);
    let publisher: Option<Arc<dyn EventPublisher>> = match &args.event_log {
        Some(path) => Some(Arc::new(FileEventPublisher::new(path)?)),
        None => None,
    };

    info!(
        host = %config.target,
        strategy = config.strategy.name(),
        workers = args.workers,
        seed,
        "starting workers"
    );

    let mut workers = JoinSet::new();
    for index in 0..args.workers.max(1) {
        let worker = format!("worker-{index}");
        let mut telemetry = ControlTelemetry::builder("harvester.control")
            .worker(&worker)
            .target(&config.target)
            .min_level(level);
        if let Some(path) = &args.log_path {
            telemetry = telemetry.log_path(path);
        }
        if let Some(publisher) = &publisher {
            telemetry = telemetry.event_publisher(Arc::clone(publisher));
        }
        let mut controller = AdaptiveController::builder(config.clone())
            .target(Arc::clone(&target))
            .store(Arc::clone(&store))
            .telemetry(telemetry.build()?)
            .rng(SmallRng::seed_from_u64(seed.wrapping_add(u64::from(index) + 1)))
            .build()?;
        let iterations = args.iterations;
        workers.spawn(async move {
            let outcome = match iterations {
                Some(limit) => controller.run_for(limit).await,
                None => match controller.run().await {
                    Ok(never) => match never {},
                    Err(err) => Err(err),
                },
            };
            (worker, outcome)
        });
    }

    while let Some(joined) = workers.join_next().await {
        let (worker, outcome) = joined.context("worker task panicked")?;
        let metrics = outcome.with_context(|| format!("{worker} stopped"))?;
        report(&worker, &metrics)?;
    }
    let snapshot = target.snapshot();
    info!(
        defense = snapshot.defense,
        current_yield = snapshot.current_yield,
        "target state after run"
    );
    Ok(())
}

fn report(worker: &str, metrics: &ControllerMetrics) -> Result<()> {
    let line = serde_json::json!({ "worker": worker, "metrics": metrics });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

async fn handle_inspect(host: &str, store_dir: &Path) -> Result<()> {
    let store = FileTuningStore::new(store_dir)?;
    match store.read_record(&record_key(host)).await? {
        Some(text) => match WeightTuning::from_record(&text) {
            Some(weights) => println!("{}", serde_json::to_string_pretty(&weights)?),
            None => println!("{text}"),
        },
        None => println!("no tuning record for {host}"),
    }
    Ok(())
}
