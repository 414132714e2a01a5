//! Send command implementation.

use anyhow::{bail, Result};

use stitch_core::client::ChunkSender;
use stitch_core::file::format_size;

use super::SendArgs;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;

    if let Some(server) = args.server {
        config.client.server_url = server;
    }
    if let Some(size) = args.chunk_size {
        config.client.chunk_size = size;
    }
    if let Some(parallel) = args.parallel {
        config.client.parallel_chunks = parallel;
    }
    if args.insecure {
        config.client.accept_invalid_certs = true;
    }
    config.validate()?;

    let sender = ChunkSender::new(&config.client)?;

    if !args.quiet {
        println!();
        println!("Stitch v{}", stitch_core::VERSION);
        println!("{}", "-".repeat(37));
        println!(
            "  Server:  {}  ({} chunks, {} parallel)",
            sender.base_url(),
            format_size(config.client.chunk_size as u64),
            config.client.parallel_chunks
        );
        println!();
    }

    let results = sender.send_files(&args.files).await;

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(report) => {
                if !args.quiet {
                    println!(
                        "  [ok]     {}  {} in {} chunk(s)",
                        report.file_name,
                        format_size(report.size),
                        report.chunks
                    );
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("  [failed] {}: {}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} file(s) failed to upload", failed, results.len());
    }
    if !args.quiet {
        println!();
        println!("Sent {} file(s)", results.len());
    }
    Ok(())
}
