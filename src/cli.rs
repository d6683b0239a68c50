use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::LAYOUTPLAN_VERSION;

#[derive(Parser, Debug)]
#[clap(version = LAYOUTPLAN_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Propose a storage layout for a partitioning profile
    Propose {
        /// Description of the current devices
        #[clap(short, long)]
        devicegraph: PathBuf,

        /// Partitioning profile to apply
        #[clap(short, long)]
        profile: PathBuf,

        /// Settings for making space on the disks
        #[clap(short, long)]
        settings: Option<PathBuf>,

        /// Default sizes and filesystems per mount point
        #[clap(long)]
        volumes: Option<PathBuf>,

        /// Path to save the result instead of printing it
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Path to save an eventual fatal error
        #[clap(short, long)]
        error: Option<PathBuf>,
    },

    /// Print the devices of a device graph description
    Show {
        /// Description of the devices
        #[clap(short, long)]
        devicegraph: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Propose { .. } => "propose",
            Commands::Show { .. } => "show",
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
