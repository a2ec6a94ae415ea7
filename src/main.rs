use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trafficking_sim::{
    engine::{EngineBuilder, EngineSettings},
    scenario::{Scenario, ScenarioLoader},
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Trafficking network flow simulation")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario to completion
    Run(RunArgs),
    /// Run a scenario behind the observer HTTP api
    Serve {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Path to the scenario YAML file
    #[arg(default_value = "scenarios/south_asia.yaml")]
    scenario: PathBuf,

    /// Override the number of simulated years
    #[arg(long)]
    years: Option<u32>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the snapshot interval in years (0 disables snapshots)
    #[arg(long)]
    snapshot_interval: Option<u32>,

    /// Directory for snapshots and the age dump
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Skip the per-location captive age files
    #[arg(long)]
    no_age_dump: bool,
}

struct Prepared {
    scenario: Scenario,
    years: u32,
    settings: EngineSettings,
}

impl RunArgs {
    fn prepare(self) -> Result<Prepared> {
        let mut scenario = ScenarioLoader::new(".").load(&self.scenario)?;
        if let Some(seed) = self.seed {
            scenario.seed = seed;
        }
        let years = scenario.years(self.years);
        let age_dump_dir = (scenario.age_dump && !self.no_age_dump)
            .then(|| self.output_dir.join("ages"));
        let settings = EngineSettings {
            scenario_name: scenario.name.clone(),
            snapshot_interval_years: self
                .snapshot_interval
                .unwrap_or(scenario.snapshot_interval_years),
            snapshot_dir: self.output_dir.join("snapshots"),
            age_dump_dir,
        };
        Ok(Prepared {
            scenario,
            years,
            settings,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Serve { run, host, port } => {
            let Prepared {
                scenario,
                years,
                settings,
            } = run.prepare()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(web::run(WebServerConfig {
                scenario,
                years,
                snapshot_interval: settings.snapshot_interval_years,
                snapshot_dir: settings.snapshot_dir,
                age_dump_dir: settings.age_dump_dir,
                host,
                port,
            }))
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let Prepared {
        scenario,
        years,
        settings,
    } = args.prepare()?;
    let mut world = scenario.build_world()?;
    let mut engine = EngineBuilder::new(settings).build();

    let summary = engine.run(&mut world, years)?;
    info!(
        scenario = %scenario.name,
        years,
        seed = summary.seed,
        start_year = summary.start_year,
        final_year = summary.final_year,
        acquired = summary.stats.acquired,
        moved = summary.stats.moved,
        escaped = summary.stats.escaped,
        reacquired = summary.stats.reacquired,
        retired = summary.stats.retired,
        released = summary.stats.released,
        snapshots = summary.snapshots.len(),
        "scenario completed"
    );
    println!(
        "Scenario '{}' completed for {} years. Captives: {}, escapees: {}, population: {}",
        scenario.name,
        years,
        world.total_captives(),
        world.total_escapees(),
        world.total_population()
    );
    Ok(())
}
