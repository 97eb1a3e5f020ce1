//! Disk persistence for the main cache and the plugin response cache
//! (spec §4.C, §4.D, §6 "Persisted state").
//!
//! The live format is bincode over gzip (the nearest idiomatic Rust
//! equivalent of the original's gob-over-gzip — see SPEC_FULL.md §4.C).
//! A JSON-over-gzip path exists purely for debugging/inspection, and
//! readers additionally tolerate the prior uncompressed layout as a
//! fallback (spec §6).

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Write `bytes` to `path` via write-temp + atomic rename, so a reader
/// never observes a partially-written file (spec §4.C persistence rule).
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("creating cache directory")?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = fs::File::create(&tmp_path).context("creating temp snapshot file")?;
        tmp.write_all(bytes).context("writing temp snapshot file")?;
        tmp.sync_all().ok();
    }
    fs::rename(&tmp_path, path).context("renaming temp snapshot into place")?;
    Ok(())
}

fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Serialize `value` with bincode, gzip it, and write it atomically.
pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = bincode::serialize(value).context("bincode-encoding snapshot")?;
    let gz = gzip_compress(&encoded).context("gzip-compressing snapshot")?;
    atomic_write(path, &gz)
}

/// Same as `save_snapshot` but JSON instead of bincode — kept only for
/// debugging/inspection (spec §9 Open Questions resolution).
pub fn save_snapshot_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_vec(value).context("json-encoding snapshot")?;
    let gz = gzip_compress(&encoded).context("gzip-compressing snapshot")?;
    atomic_write(path, &gz)
}

/// Load a snapshot, tolerating (in order): bincode+gzip (live format),
/// JSON+gzip (debug format), and raw uncompressed bincode/JSON (legacy
/// layout predating compression).
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading snapshot at {}", path.display()))?;

    if let Ok(raw) = gzip_decompress(&bytes) {
        if let Ok(v) = bincode::deserialize::<T>(&raw) {
            return Ok(v);
        }
        if let Ok(v) = serde_json::from_slice::<T>(&raw) {
            return Ok(v);
        }
    }
    if let Ok(v) = bincode::deserialize::<T>(&bytes) {
        return Ok(v);
    }
    if let Ok(v) = serde_json::from_slice::<T>(&bytes) {
        return Ok(v);
    }
    Err(anyhow!(
        "snapshot at {} did not match any known format (bincode+gzip, json+gzip, bincode, json)",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn round_trips_through_bincode_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.bin.gz");
        let mut data = HashMap::new();
        data.insert("a".to_string(), vec![1u32, 2, 3]);
        save_snapshot(&path, &data).unwrap();
        let loaded: HashMap<String, Vec<u32>> = load_snapshot(&path).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn tolerates_legacy_uncompressed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        let data: HashMap<String, i32> = [("x".to_string(), 42)].into_iter().collect();
        fs::write(&path, serde_json::to_vec(&data).unwrap()).unwrap();
        let loaded: HashMap<String, i32> = load_snapshot(&path).unwrap();
        assert_eq!(loaded.get("x"), Some(&42));
    }

    #[test]
    fn atomic_write_never_leaves_a_dangling_temp_file_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        atomic_write(&path, b"hello").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
