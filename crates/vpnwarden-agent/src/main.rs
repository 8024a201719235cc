use std::path::PathBuf;

use clap::Parser;
use clap::builder::BoolishValueParser;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use vpnwarden_agent::config::{self, ProfileParams};
use vpnwarden_agent::reconcile::{self, ReconcileOptions};
use vpnwarden_agent::report::Report;
use vpnwarden_agent::store;
use vpnwarden_types::PresharedKey;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for the report block
    #[cfg(distribute)]
    {
        fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    #[cfg(not(distribute))]
    {
        fmt()
            .pretty()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("GIT_VERSION"))]
#[command(about = "Ensure a Windows VPN connection profile matches the desired settings")]
struct Args {
    /// VPN endpoint
    #[arg(long, env = "VPNWARDEN_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// Automatic, Ikev2, L2tp, Pptp or Sstp
    #[arg(long, env = "VPNWARDEN_TUNNEL_TYPE")]
    tunnel_type: Option<String>,

    /// Make the profile available before logon [default: true]
    #[arg(long, env = "VPNWARDEN_ALL_USER_CONNECTION", value_parser = BoolishValueParser::new())]
    all_user_connection: Option<bool>,

    /// L2TP/IKE preshared key
    #[arg(long, env = "VPNWARDEN_PRESHARED_KEY", hide_env_values = true)]
    preshared_key: Option<String>,

    /// Chap, Eap, MachineCertificate, MSChapv2 or Pap
    #[arg(long, env = "VPNWARDEN_AUTHENTICATION_METHOD")]
    authentication_method: Option<String>,

    /// 1 to enable split tunneling, 0 to disable [default: 0]
    #[arg(long, env = "VPNWARDEN_SPLIT_TUNNEL")]
    split_tunnel: Option<String>,

    /// Client name used in the profile name [default: Automated]
    #[arg(long, env = "VPNWARDEN_CLIENT_NAME")]
    client_name: Option<String>,

    /// Optional TOML file with the same settings; flags and environment win
    #[arg(short, long, env = "VPNWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// PowerShell interpreter used to reach the VPN client cmdlets
    #[arg(long, env = "VPNWARDEN_POWERSHELL", default_value = "powershell.exe")]
    powershell: String,

    /// Fail instead of recreating when the profile lookup itself errors
    #[arg(long, env = "VPNWARDEN_STRICT_LOOKUP")]
    strict_lookup: bool,
}

impl Args {
    fn profile_params(&self) -> ProfileParams {
        ProfileParams {
            server_address: self.server_address.clone(),
            tunnel_type: self.tunnel_type.clone(),
            all_user_connection: self.all_user_connection,
            preshared_key: self.preshared_key.clone().map(PresharedKey::new),
            authentication_method: self.authentication_method.clone(),
            split_tunnel: self.split_tunnel.clone(),
            client_name: self.client_name.clone(),
        }
    }
}

async fn run(args: &Args) -> Report {
    let desired = match config::resolve(args.config.as_deref(), args.profile_params()).await {
        Ok(desired) => desired,
        Err(e) => {
            error!(error = %e, "invalid invocation");
            return Report::failed(e.to_string());
        }
    };

    let store = store::open(&args.powershell);
    let options = ReconcileOptions {
        strict_lookup: args.strict_lookup,
    };
    reconcile::reconcile(&store, &desired, options).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    info!(
        powershell = %args.powershell,
        strict_lookup = args.strict_lookup,
        "starting vpnwarden-agent"
    );

    let report = run(&args).await;
    info!(success = report.is_success(), "finished");

    let mut block = report.render();
    block.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(block.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
