use std::{fs, path::PathBuf};

use argp::FromArgs;
use tracing::debug;

use rvth::{
    verify::{verify_image, PartitionOutcome, VerifyOptions, VerifyReport},
    Error, Result, ResultContext,
};

#[derive(FromArgs, Debug)]
/// Verifies a bank of an RVT-H device image, or a standalone disc image.
#[argp(subcommand, name = "verify")]
pub struct Args {
    #[argp(positional)]
    /// path to device or disc image
    file: PathBuf,
    #[argp(option, short = 'b')]
    /// bank number (1-8, default 1)
    bank: Option<usize>,
    #[argp(option, short = 't')]
    /// hashing threads (default: all cores)
    threads: Option<usize>,
}

pub fn run(args: Args) -> Result<()> {
    let bank = args.bank.unwrap_or(1);
    if bank == 0 {
        return Err(Error::Other("bank numbers start at 1".to_string()));
    }
    let image = fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let options = VerifyOptions { threads: args.threads.unwrap_or_else(num_cpus::get) };
    debug!(threads = options.threads, "verifying bank {}", bank);
    let report = verify_image(&image, bank - 1, &options)?;
    print_report(&report);
    if report.is_clean() {
        Ok(())
    } else {
        Err(Error::Other("verification found problems".to_string()))
    }
}

fn print_report(report: &VerifyReport) {
    println!("Title: {}", report.game_title);
    println!("Game ID: {}", report.game_id);
    println!("Disc type: {}", report.kind);
    if let Some(boot) = report.boot {
        println!("Boot chain: {}", boot);
    }
    for partition in &report.partitions {
        println!(
            "Partition {} ({}) at {:#x}:",
            partition.index, partition.kind, partition.offset
        );
        println!("  Hashes: {}", partition.outcome);
        if let PartitionOutcome::Verified(outcome) = &partition.outcome {
            for mismatch in &outcome.cluster_mismatches {
                println!("    cluster {}: {} mismatch", mismatch.cluster, mismatch.level);
            }
        }
        println!("  Boot chain: {}", partition.boot);
    }
    println!("Result: {}", if report.is_clean() { "OK" } else { "FAILED" });
}
