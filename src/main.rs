use clap::Parser;
use healthguard::cli::commands::{audit_cmd, hash, maintain, rotate, schedule};
use healthguard::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // Background jobs report through the log; one-shot commands stay quiet.
    let level = match cli.command {
        Commands::Schedule | Commands::Rotate => "info",
        _ => "warn",
    };
    healthguard::logging::init(level);

    let result = match cli.command {
        Commands::Verify => audit_cmd::verify(&cli),
        Commands::Log { page, limit } => audit_cmd::log(&cli, page, limit),
        Commands::Show { id } => audit_cmd::show(&cli, id),
        Commands::Stats => audit_cmd::stats(&cli),
        Commands::Hash {
            ref kind,
            ref value,
            ref record,
        } => hash::execute(&cli, kind, value, record.as_deref()),
        Commands::Rotate => rotate::execute(&cli),
        Commands::Maintain => maintain::execute(&cli),
        Commands::Schedule => schedule::execute(&cli),
    };

    if let Err(e) = result {
        healthguard::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
