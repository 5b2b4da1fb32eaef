//! Fixture provisioning.
//!
//! Downloads are only testable against files of known size and content,
//! so the provisioner materializes the configured fixture set before the
//! server accepts connections. Content is pseudo-random but seeded from
//! the fixture name: re-provisioning produces byte-identical files, which
//! lets a test harness verify served bytes against the file on disk.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::ServerConfig;

const WRITE_BLOCK: usize = 64 * 1024;

/// Create the files directory and every configured fixture.
pub async fn provision(config: &ServerConfig) -> io::Result<()> {
    fs::create_dir_all(&config.files_dir).await?;
    for spec in &config.fixtures {
        ensure(&config.files_dir, &spec.name, spec.size).await?;
    }
    Ok(())
}

/// Idempotently guarantee a fixture of exactly `size` bytes exists.
///
/// A file of the right size is left untouched; a missing file or one of
/// the wrong size is (re)generated.
pub async fn ensure(dir: &Path, name: &str, size: u64) -> io::Result<PathBuf> {
    let path = dir.join(name);

    match fs::metadata(&path).await {
        Ok(meta) if meta.len() == size => return Ok(path),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    info!(name, size, "generating fixture");

    let mut rng = StdRng::seed_from_u64(seed_for(name));
    let mut file = fs::File::create(&path).await?;
    let mut block = vec![0u8; WRITE_BLOCK];
    let mut left = size;
    while left > 0 {
        let n = WRITE_BLOCK.min(usize::try_from(left).unwrap_or(WRITE_BLOCK));
        rng.fill_bytes(&mut block[..n]);
        file.write_all(&block[..n]).await?;
        left -= n as u64;
    }
    file.flush().await?;

    Ok(path)
}

fn seed_for(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}
