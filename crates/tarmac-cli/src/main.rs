//! Tarmac CLI - lands approved merge proposals.

use clap::Parser;

mod commands;
mod logging;
mod output;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    output::set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Merge(args) => commands::merge::run(&args),
        Commands::Plugins => commands::plugins::run(),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
