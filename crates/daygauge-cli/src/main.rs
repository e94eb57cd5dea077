use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "daygauge", version, about = "Daily gauges: raise once a day, decay every day")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every gauge with its current value
    List,
    /// Add a gauge (letters only)
    Add {
        /// Gauge name
        name: String,
    },
    /// Remove a gauge and its history
    Remove {
        /// Gauge name
        name: String,
    },
    /// Increment a gauge, at most once per calendar day
    Increment {
        /// Gauge name
        name: String,
    },
    /// Run the daily decay cycle
    Cycle {
        /// Run even if the cycle already ran today
        #[arg(long)]
        force: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::List => commands::gauge::list(),
        Commands::Add { name } => commands::gauge::add(&name),
        Commands::Remove { name } => commands::gauge::remove(&name),
        Commands::Increment { name } => commands::gauge::increment(&name),
        Commands::Cycle { force } => commands::cycle::run(force),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
