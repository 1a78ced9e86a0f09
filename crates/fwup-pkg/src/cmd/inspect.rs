//! Inspect command

use std::path::Path;

use anyhow::{Context, Result};
use fwup_core::io::extract::read_embedded_manifest;
use fwup_schema::Sha256Digest;

/// Print the archive digest, its embedded manifest and every entry.
pub fn inspect(archive: &Path) -> Result<()> {
    let (digest, size) = Sha256Digest::compute_file(archive)
        .with_context(|| format!("Failed to read {}", archive.display()))?;
    let manifest = read_embedded_manifest(archive)
        .with_context(|| format!("{} is not a package", archive.display()))?;

    println!("archive   {}", archive.display());
    println!("sha256    {digest}");
    println!("size      {size}");
    println!("revision  {}", manifest.commit_sha);
    println!("branch    {}", manifest.branch);
    println!("summary   {}", manifest.commit_pretty);
    println!();

    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(file);
    for entry in tar.entries()? {
        let entry = entry?;
        let path = entry.path()?.display().to_string();
        println!("{:>10}  {path}", entry.header().size()?);
    }
    Ok(())
}
