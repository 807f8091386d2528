//! Benchmarks randomized range reads against S3-compatible object storage.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    rangebench_cli::cli::execute()
}
