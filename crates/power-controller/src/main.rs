use anyhow::Context;
use anyhow::Result;
use api_types::PowerWorkload;
use clap::Parser;
use kube::CustomResourceExt;
use power_controller::app::ApplicationBuilder;
use power_controller::config::Cli;
use power_controller::config::Commands;
use power_controller::config::DaemonArgs;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
        Commands::Crd => print_crd(),
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init();

    tracing::info!("Starting power pod controller {}", version::VERSION);

    let app = ApplicationBuilder::new(daemon_args).build().await?;

    app.run().await?;
    app.shutdown().await?;

    Ok(())
}

fn print_crd() -> Result<()> {
    let crd = serde_yaml::to_string(&PowerWorkload::crd())
        .context("serialize PowerWorkload CRD failed")?;
    print!("{crd}");
    Ok(())
}
