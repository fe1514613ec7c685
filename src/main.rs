use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use secops::cli::{self, Cli, Commands};
use secops::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);

    match cli.command {
        Commands::Keys(args) => cli::keys::run(args, cli.json),
        Commands::Audit(args) => cli::audit::run(args, cli.json),
        Commands::Compliance(args) => cli::compliance::run(args, cli.json),
        Commands::Event(args) => cli::event::run(args, cli.json),
        Commands::Dashboard => cli::dashboard::run(cli.json),
        Commands::Daemon(args) => cli::daemon::run(args).await,
        Commands::Config(args) => cli::config::run(args),
        Commands::Paths => cli::paths::run(),
    }
}

/// `RUST_LOG` wins, then `--verbose`, then `[logging]` from the config file.
fn init_logging(verbose: bool) {
    let logging = Config::load().map(|c| c.logging).unwrap_or_default();
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
