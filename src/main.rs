use blendscan::cli::{Cli, CliHandler, ReportFormatter};
use std::process;
use tracing_subscriber::EnvFilter;

fn init_logging(cli: &Cli) {
    let default_level = if cli.is_debug() {
        "blendscan=debug"
    } else if cli.is_verbose() {
        "blendscan=info"
    } else {
        "blendscan=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(cli.should_use_color())
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Parse command line arguments; clap exits 2 on usage errors and 0 for --help
    let cli = match Cli::parse_args() {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    init_logging(&cli);
    let formatter = ReportFormatter::new(cli.should_use_color(), cli.is_verbose());

    // Create and run the CLI handler
    let handler = CliHandler::new(cli);

    let exit_code = match handler.run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e));
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
