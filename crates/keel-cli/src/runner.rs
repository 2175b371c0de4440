use clap::{Parser, Subcommand};

use crate::master::run_master;

#[derive(Parser)]
#[command(version, name = "keel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cluster master.
    Master,
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Master => run_master(),
    }
}
