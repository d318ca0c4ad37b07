use clap::{Parser, Subcommand};
use utils::version;

use crate::config::daemon::DaemonArgs;

#[derive(Parser)]
#[command(about, long_about, version = version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the power pod controller
    Daemon(Box<DaemonArgs>),
    /// Print the PowerWorkload CustomResourceDefinition as YAML
    Crd,
}
