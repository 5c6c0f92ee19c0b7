use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    // Diagnostics are opt-in: CCP_LOG=debug (etc.) turns them on.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CCP_LOG").unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = ccp::Cli::parse();
    let exit_code = match ccp::run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    std::process::exit(exit_code);
}
