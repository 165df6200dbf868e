use argp::FromArgs;

pub mod cmd;

// Re-export rvth
pub use rvth;

#[derive(FromArgs, Debug)]
#[argp(subcommand)]
pub enum SubCommand {
    List(cmd::list::Args),
    Verify(cmd::verify::Args),
}

pub fn run(command: SubCommand) -> rvth::Result<()> {
    match command {
        SubCommand::List(c_args) => cmd::list::run(c_args),
        SubCommand::Verify(c_args) => cmd::verify::run(c_args),
    }
}
