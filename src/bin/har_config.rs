//! Generates a topology file and hosts file from a recorded HAR.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;

use harnet::har::{generate, load_har, GeneratorOptions, DEFAULT_SERVER_CMD};

#[derive(Parser, Debug)]
#[command(name = "har-config")]
#[command(about = "Generate a harnet topology and hosts file from a HAR file")]
#[command(version)]
struct Cli {
    /// The HAR file to replay
    har: PathBuf,

    /// Directory receiving `hosts` and `mininet-config.json`
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Server program started on every origin host
    #[arg(long, default_value = DEFAULT_SERVER_CMD)]
    server_cmd: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Reading HAR file {:?}", cli.har);
    let har = load_har(&cli.har)?;

    let options = GeneratorOptions {
        har_path: cli.har.clone(),
        server_cmd: cli.server_cmd,
    };
    let generated = generate(&har, &options)
        .wrap_err_with(|| format!("Failed to generate configuration from '{}'", cli.har.display()))?;
    generated.write_to(&cli.output_dir)?;

    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["har-config", "page.har"]);
        assert_eq!(cli.har, PathBuf::from("page.har"));
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert_eq!(cli.server_cmd, "./har-server.js");
    }

    #[test]
    fn test_cli_requires_har() {
        assert!(Cli::try_parse_from(["har-config"]).is_err());
    }
}
