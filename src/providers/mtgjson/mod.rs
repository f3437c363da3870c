pub mod set_file;

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use crate::util::download::download_to_file;

pub use set_file::{list_set_files, scryfall_id, SetFile};

pub const ALL_SET_FILES_URL: &str = "https://mtgjson.com/api/v5/AllSetFiles.zip";

/// Download `AllSetFiles.zip`, replace `extract_dir` with its contents and remove
/// the archive afterwards.
pub async fn download_all_sets(client: &Client, url: &str, extract_dir: &Path) -> Result<usize> {
    let zip_path = extract_dir.with_extension("zip");
    info!(url, "downloading MTGJSON set archive");
    let response = client
        .get(url)
        .send()
        .await
        .context("requesting MTGJSON archive")?
        .error_for_status()
        .context("MTGJSON archive request failed")?;
    let written = download_to_file(response, &zip_path).await?;
    info!(bytes = written, path = %zip_path.display(), "archive downloaded");

    let extracted = extract_archive(&zip_path, extract_dir)?;
    fs::remove_file(&zip_path)
        .with_context(|| format!("removing archive {}", zip_path.display()))?;
    Ok(extracted)
}

/// Extract `zip_path` into a fresh `extract_dir`, returning the number of entries.
pub fn extract_archive(zip_path: &Path, extract_dir: &Path) -> Result<usize> {
    if extract_dir.exists() {
        fs::remove_dir_all(extract_dir)
            .with_context(|| format!("removing old {}", extract_dir.display()))?;
    }
    fs::create_dir_all(extract_dir)?;

    let file = File::open(zip_path).with_context(|| format!("opening {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("reading zip archive")?;
    let entries = archive.len();
    archive
        .extract(extract_dir)
        .with_context(|| format!("extracting into {}", extract_dir.display()))?;
    info!(entries, dir = %extract_dir.display(), "set archive extracted");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extract_replaces_previous_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("AllSetFiles.zip");
        {
            let file = File::create(&zip_path).unwrap();
            let mut zw = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default();
            zw.start_file("LEA.json", opts).unwrap();
            zw.write_all(br#"{"data":{"code":"LEA"}}"#).unwrap();
            zw.finish().unwrap();
        }

        let dir = tmp.path().join("AllSetFiles");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.json"), "{}").unwrap();

        let n = extract_archive(&zip_path, &dir).unwrap();
        assert_eq!(n, 1);
        assert!(dir.join("LEA.json").exists());
        assert!(!dir.join("stale.json").exists());
    }
}
