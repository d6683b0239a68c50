use std::{path::Path, process::ExitCode};

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info};

use devicegraph::{describe::Layout, fixtures};
use layoutplan::{
    cli::{Cli, Commands},
    load_yaml, AutoinstProposal,
};
use layoutplan_api::{
    error::PlannerResultExt, profile::PartitioningProfile, settings::SpaceSettings,
    volumes::VolumeSpecs,
};

fn write_yaml(output: Option<&Path>, value: &impl serde::Serialize) -> Result<(), Error> {
    let yaml = serde_yaml::to_string(value).context("Failed to serialize output")?;
    match output {
        Some(path) => std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write '{}'", path.display())),
        None => {
            print!("{yaml}");
            Ok(())
        }
    }
}

fn run(args: &Cli) -> Result<(), Error> {
    info!("Layoutplan version: {}", layoutplan::LAYOUTPLAN_VERSION);

    match &args.command {
        Commands::Propose {
            devicegraph,
            profile,
            settings,
            volumes,
            output,
            error,
        } => {
            let graph = fixtures::load(devicegraph)?;
            let profile: PartitioningProfile = load_yaml(profile)?;
            let settings: SpaceSettings = match settings {
                Some(path) => load_yaml(path)?,
                None => SpaceSettings::default(),
            };
            let volumes: VolumeSpecs = match volumes {
                Some(path) => load_yaml(path)?,
                None => VolumeSpecs::default(),
            };

            let res = AutoinstProposal::new(&graph, &profile, &settings, &volumes).propose();
            if let (Some(error_path), Err(e)) = (error.as_ref(), &res) {
                if let Err(e2) = std::fs::write(error_path, serde_yaml::to_string(e).unwrap_or_default()) {
                    error!("Failed to write error to file: {e2}");
                }
            }
            let proposal = res.unstructured(format!("Failed to execute '{}' command", args.command))?;
            write_yaml(output.as_deref(), &proposal.report())
        }
        Commands::Show { devicegraph } => {
            let graph = fixtures::load(devicegraph)?;
            write_yaml(None, &Layout::new(&graph))
        }
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    if let Err(e) = run(&args) {
        error!("Layoutplan failed: {e:?}");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
