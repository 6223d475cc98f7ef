use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{debug, info};
use std::io;
use std::path::PathBuf;

use harnet::config_loader::load_config;
use harnet::connectivity::ping_all;
use harnet::emulation::{CommandRunner, LinkImpairment, Network, RecordingRunner, ServiceOptions, SystemRunner};
use harnet::shell::Shell;
use harnet::signals::{self, process_flags};
use harnet::topology::{plan_topology, PlanOptions, TopologyPlan};

/// Emulated network with one host per web origin behind an impaired uplink
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology JSON file
    #[arg(short, long, default_value = "/etc/opt/mininet-config.json")]
    config: PathBuf,

    /// Uplink bandwidth in Mbit/s
    #[arg(long, default_value_t = 1.6)]
    bandwidth: f64,

    /// Uplink round-trip delay in milliseconds
    #[arg(long, default_value_t = 300)]
    delay: u32,

    /// Uplink jitter in milliseconds
    #[arg(long, default_value_t = 0)]
    jitter: u32,

    /// Uplink packet loss in percent
    #[arg(long, default_value_t = 0)]
    loss: u32,

    /// Directory for the per-host server logs
    #[arg(long, default_value = "/var/log/har")]
    log_dir: PathBuf,

    /// Hosts file served by the name server
    #[arg(long, default_value = "/opt/src/hosts")]
    hosts_file: PathBuf,

    /// Print the commands instead of executing them
    #[arg(long)]
    dry_run: bool,

    /// Stop the network right after the connectivity check
    #[arg(long)]
    no_shell: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    signals::install().wrap_err("Failed to install signal handlers")?;

    info!("Configuration file: {:?}", args.config);
    let config = load_config(&args.config)?;
    debug!("{:#?}", config);

    let uplink = LinkImpairment::new(args.bandwidth, args.delay, args.jitter, args.loss)
        .wrap_err("Invalid uplink parameters")?;
    info!(
        "Uplink: {} Mbit/s, {} ms delay, {} ms jitter, {}% loss",
        uplink.bandwidth_mbit, uplink.delay_ms, uplink.jitter_ms, uplink.loss_percent
    );

    let plan = plan_topology(
        &config,
        &PlanOptions {
            uplink,
            log_dir: args.log_dir.clone(),
        },
    )?;

    if args.dry_run {
        info!("Dry run: commands are printed, not executed");
        run(plan, RecordingRunner::echoing(), &args)
    } else {
        run(plan, SystemRunner, &args)
    }
}

/// Whether a signal arrived while setting up; outside the shell a Ctrl-C
/// stops the network as well
fn aborted() -> bool {
    let flags = process_flags();
    let interrupted = flags.take_interrupt();
    flags.shutdown_requested() || interrupted
}

fn run<R: CommandRunner>(plan: TopologyPlan, runner: R, args: &Args) -> Result<()> {
    let mut network = Network::new(plan, runner);
    network.build().wrap_err("Failed to build network")?;

    if !aborted() {
        network
            .start_services(&ServiceOptions {
                hosts_file: args.hosts_file.clone(),
                log_dir: args.log_dir.clone(),
            })
            .wrap_err("Failed to start services")?;
    }

    if !aborted() {
        let report = ping_all(&network)?;
        println!("{report}");

        if !args.no_shell && !args.dry_run && !aborted() {
            Shell::new(&network)
                .run(io::BufReader::new(io::stdin()), io::stdout().lock())
                .wrap_err("Shell I/O failed")?;
        }
    }

    info!("Stopping network");
    network.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["harnet"]);

        assert_eq!(args.config, PathBuf::from("/etc/opt/mininet-config.json"));
        assert_eq!(args.bandwidth, 1.6);
        assert_eq!(args.delay, 300);
        assert_eq!(args.jitter, 0);
        assert_eq!(args.loss, 0);
        assert_eq!(args.log_dir, PathBuf::from("/var/log/har"));
        assert_eq!(args.hosts_file, PathBuf::from("/opt/src/hosts"));
        assert!(!args.dry_run);
        assert!(!args.no_shell);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "harnet",
            "--config", "topo.json",
            "--bandwidth", "10",
            "--delay", "40",
            "--jitter", "5",
            "--loss", "1",
            "--dry-run",
            "--no-shell",
        ]);

        assert_eq!(args.config, PathBuf::from("topo.json"));
        assert_eq!(args.bandwidth, 10.0);
        assert_eq!(args.delay, 40);
        assert_eq!(args.jitter, 5);
        assert_eq!(args.loss, 1);
        assert!(args.dry_run);
        assert!(args.no_shell);
    }

    #[test]
    fn test_cli_rejects_negative_delay() {
        assert!(Args::try_parse_from(["harnet", "--delay", "-5"]).is_err());
    }
}
