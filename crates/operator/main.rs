use clap::Parser;
use management_ingress::controllers::ingress_controller::{self, State};
use management_ingress::util::{settings::Settings, telemetry};
use tracing::info;

mod handlers;
mod server;

#[derive(Parser, Debug)]
#[command(name = "management-ingress-operator", about = "Runs the ManagementIngress controller")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Address the health and metrics server listens on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind_address: String,

    /// Log as JSON instead of the compact format
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json)?;
    info!(version = %cli.settings.version, "Starting management ingress operator");

    // Initiatilize Kubernetes controller state
    let state = State::default();
    let controller = ingress_controller::run(state.clone(), cli.settings);
    let server = server::start_server(state, &cli.bind_address);

    // Both runtimes implements graceful shutdown, so poll until both are done
    let (controller, server) = tokio::join!(controller, server);
    controller?;
    server?;
    Ok(())
}
