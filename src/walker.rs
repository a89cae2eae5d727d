//! Archive Walker (C6, §4.6): locates payload files inside a zip archive or
//! a directory of them and feeds them to the worker pool over a bounded
//! channel. Grounded on `cmd/parse_intelx.go`'s `AddZipFile`/`AddFolder`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use intelparser_core::model::ManifestEntry;
use tokio::sync::mpsc;

use crate::disk::{has_headroom, DiskProbe};
use crate::manifest::parse_manifest;

const SKIPPED_ENTRIES: &[&str] = &["info.csv", "info.sqlite3", ".ds_store"];

/// One payload file discovered under an archive or folder, ready for the
/// worker pool to fingerprint and scan.
#[derive(Clone)]
pub struct FileItem {
    pub real_path: PathBuf,
    pub virtual_path: String,
    pub manifest: Arc<HashMap<String, ManifestEntry>>,
}

pub struct Walker<'a> {
    disk_probe: &'a dyn DiskProbe,
}

impl<'a> Walker<'a> {
    pub fn new(disk_probe: &'a dyn DiskProbe) -> Self {
        Self { disk_probe }
    }

    /// Walks `input_path` (a single zip file, or a directory that either
    /// holds an `Info.csv` directly or a set of sibling `.zip` archives)
    /// and sends every payload found into `tx`. Extraction happens under
    /// `temp_root`, which the caller is responsible for removing once the
    /// pool has drained the channel.
    pub async fn run(
        &self,
        input_path: &Path,
        temp_root: &Path,
        tx: mpsc::Sender<FileItem>,
    ) -> Result<()> {
        let meta = tokio::fs::metadata(input_path)
            .await
            .with_context(|| format!("reading {}", input_path.display()))?;

        if meta.is_file() {
            return self.add_zip_file(temp_root, input_path, tx).await;
        }

        if input_path.join("Info.csv").exists() {
            return self.add_folder(input_path, None, tx).await;
        }

        let mut entries = std::fs::read_dir(input_path)
            .with_context(|| format!("reading directory {}", input_path.display()))?;
        let mut found_archive = false;
        while let Some(entry) = entries.next().transpose()? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            found_archive = true;
            let archive_size = entry.metadata()?.len();
            if !has_headroom(self.disk_probe, temp_root, archive_size)? {
                bail!(
                    "insufficient free disk space to extract {}",
                    path.display()
                );
            }
            self.add_zip_file(temp_root, &path, tx.clone()).await?;
        }

        if !found_archive {
            bail!(
                "{} has no Info.csv and contains no .zip archives",
                input_path.display()
            );
        }
        Ok(())
    }

    async fn add_zip_file(
        &self,
        temp_root: &Path,
        zip_path: &Path,
        tx: mpsc::Sender<FileItem>,
    ) -> Result<()> {
        let kind = infer::get_from_path(zip_path)
            .with_context(|| format!("sniffing {}", zip_path.display()))?;
        if kind.map(|k| k.mime_type()) != Some("application/zip") {
            bail!("{} is not a zip archive", zip_path.display());
        }

        let stem = zip_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let extract_dir = temp_root.join(format!("{stem}-{}", std::process::id()));
        std::fs::create_dir_all(&extract_dir)
            .with_context(|| format!("creating {}", extract_dir.display()))?;

        let file = std::fs::File::open(zip_path)
            .with_context(|| format!("opening {}", zip_path.display()))?;
        let mut archive =
            zip::ZipArchive::new(file).with_context(|| format!("reading {}", zip_path.display()))?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(out_path) = entry.enclosed_name() else {
                continue;
            };
            let out_path = extract_dir.join(out_path);
            if entry.is_dir() {
                std::fs::create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out_file = std::fs::File::create(&out_path)
                .with_context(|| format!("writing {}", out_path.display()))?;
            std::io::copy(&mut entry, &mut out_file)?;
        }

        let zip_name = zip_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| stem.clone());
        self.add_folder(&extract_dir, Some(zip_name), tx).await
    }

    async fn add_folder(
        &self,
        folder: &Path,
        zip_source: Option<String>,
        tx: mpsc::Sender<FileItem>,
    ) -> Result<()> {
        let info_path = folder.join("Info.csv");
        if !info_path.exists() {
            bail!("{} has no Info.csv manifest", folder.display());
        }
        let manifest = Arc::new(parse_manifest(&info_path)?);

        let prefix = zip_source.unwrap_or_else(|| {
            folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        for entry in std::fs::read_dir(folder)
            .with_context(|| format!("reading {}", folder.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if SKIPPED_ENTRIES.contains(&name.to_lowercase().as_str()) {
                continue;
            }

            let item = FileItem {
                real_path: entry.path(),
                virtual_path: format!("{prefix}/{name}"),
                manifest: manifest.clone(),
            };
            if tx.send(item).await.is_err() {
                // Receiver dropped: pool has been cancelled, stop walking.
                return Ok(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::StatvfsDiskProbe;

    fn write_manifest(dir: &Path, rows: &str) {
        std::fs::write(
            dir.join("Info.csv"),
            format!("Name,Date,Bucket,Media,Content,Type,Size,System ID\n{rows}"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn add_folder_skips_manifest_and_sends_payloads() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "passwords.txt,2024-01-02 03:04:05,leaks,text,creds,file,10,passwords\n",
        );
        std::fs::write(dir.path().join("passwords.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("info.sqlite3"), b"ignored").unwrap();

        let probe = StatvfsDiskProbe;
        let walker = Walker::new(&probe);
        let (tx, mut rx) = mpsc::channel(4);
        walker.add_folder(dir.path(), None, tx).await.unwrap();

        let item = rx.recv().await.expect("one payload item");
        assert!(item.virtual_path.ends_with("passwords.txt"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn add_folder_errors_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let probe = StatvfsDiskProbe;
        let walker = Walker::new(&probe);
        let (tx, _rx) = mpsc::channel(4);
        assert!(walker.add_folder(dir.path(), None, tx).await.is_err());
    }

    #[tokio::test]
    async fn run_rejects_directory_with_no_manifest_or_archives() {
        let dir = tempfile::tempdir().unwrap();
        let probe = StatvfsDiskProbe;
        let walker = Walker::new(&probe);
        let (tx, _rx) = mpsc::channel(4);
        assert!(walker.run(dir.path(), dir.path(), tx).await.is_err());
    }
}
