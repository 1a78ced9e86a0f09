//! Hash command

use std::path::PathBuf;

use anyhow::{Context, Result};
use fwup_schema::Sha256Digest;

/// Print `<sha256> <size> <path>` for each file.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let (digest, size) = Sha256Digest::compute_file(file)
            .with_context(|| format!("Failed to hash {}", file.display()))?;
        println!("{digest} {size} {}", file.display());
    }
    Ok(())
}
