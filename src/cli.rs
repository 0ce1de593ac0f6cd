use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "unattended application updater")]
pub struct Args {
    /// Sub‑commands (update, check, status)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Download and install the configured update if needed (default if no sub‑command)
    Update {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Updater instance name (selects the cache directory)
        #[arg(long, short = 'n', default_value = "default")]
        name: String,
    },
    /// Check whether an update is needed (Exit 0 = needed, 1 = up to date)
    Check {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Updater instance name (selects the cache directory)
        #[arg(long, short = 'n', default_value = "default")]
        name: String,
    },
    /// Print the cached download/install record as JSON
    Status {
        /// Updater instance name (selects the cache directory)
        #[arg(long, short = 'n', default_value = "default")]
        name: String,
    },
}
