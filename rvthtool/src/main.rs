use argp::FromArgs;
use tracing_subscriber::EnvFilter;

use rvthtool::SubCommand;

#[derive(FromArgs, Debug)]
/// Tool for listing and verifying RVT-H Reader bank images.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    if let Err(e) = rvthtool::run(args.command) {
        eprintln!("Failed: {}", e);
        std::process::exit(1);
    }
}
