//! Input stage: turn whatever the caller hands us into a local PDF path.
//!
//! Accepted inputs are a file-system path or an http(s) URL. Either way the
//! rest of the pipeline only ever sees a path, because pdfium opens files,
//! not byte streams. Both sources pass the same `%PDF` magic gate before
//! anything downstream touches them; a wrong magic is [`ScanTexError::NotAPdf`]
//! with the offending bytes, while a file pdfium later rejects is
//! [`ScanTexError::CorruptPdf`]. Downloads are checked before the bytes are
//! written, so a bad download leaves nothing on disk.

use crate::error::ScanTexError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A usable local PDF, however the input arrived.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// Downloaded into a temp directory; the guard keeps the file alive
    /// until the run is done with it.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to a local, magic-checked PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ScanTexError> {
    if is_url(input) {
        download(input, timeout_secs).await
    } else {
        open_local(input)
    }
}

/// Reject anything whose first bytes are not `%PDF`.
///
/// Inputs shorter than the magic fail too; the report carries whatever
/// bytes were there.
fn check_magic(bytes: &[u8], path: &Path) -> Result<(), ScanTexError> {
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    if n < 4 || &magic != PDF_MAGIC {
        return Err(ScanTexError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn open_local(path_str: &str) -> Result<ResolvedInput, ScanTexError> {
    use std::io::Read;

    let path = PathBuf::from(path_str);
    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScanTexError::PermissionDenied { path })
        }
        Err(_) => return Err(ScanTexError::FileNotFound { path }),
    };

    let mut head = [0u8; 4];
    let n = file.read(&mut head).unwrap_or(0);
    check_magic(&head[..n], &path)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ScanTexError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScanTexError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ScanTexError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ScanTexError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;
    if !response.status().is_success() {
        return Err(ScanTexError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ScanTexError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ScanTexError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let temp_dir = TempDir::new().map_err(|e| ScanTexError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(url_filename(url));

    // Gate before writing so a non-PDF response never lands on disk.
    check_magic(&bytes, &path)?;

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ScanTexError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a filename, otherwise a
/// fixed fallback. Query strings and fragments are ignored.
fn url_filename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let trimmed = &url[..end];
    match trimmed.rsplit_once('/') {
        Some((_, last)) if !last.is_empty() && last.contains('.') => last,
        _ => "downloaded.pdf",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.org/scan.pdf"));
        assert!(is_url("http://example.org/scan.pdf"));
        assert!(!is_url("scan.pdf"));
        assert!(!is_url("/data/scan.pdf"));
    }

    #[test]
    fn url_filename_falls_back_without_extension() {
        assert_eq!(url_filename("https://example.org/docs/scan.pdf"), "scan.pdf");
        assert_eq!(
            url_filename("https://example.org/docs/scan.pdf?dl=1"),
            "scan.pdf"
        );
        assert_eq!(url_filename("https://example.org/download"), "downloaded.pdf");
        assert_eq!(url_filename("https://example.org/"), "downloaded.pdf");
    }

    #[test]
    fn missing_local_file() {
        let err = open_local("/no/such/scan.pdf").unwrap_err();
        assert!(matches!(err, ScanTexError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actually_a_zip.pdf");
        std::fs::write(&path, b"PK\x03\x04zipzip").unwrap();
        let err = open_local(path.to_str().unwrap()).unwrap_err();
        match err {
            ScanTexError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("expected NotAPdf, got {other}"),
        }
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.pdf");
        std::fs::write(&path, b"%P").unwrap();
        let err = open_local(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScanTexError::NotAPdf { .. }));
    }

    #[test]
    fn valid_magic_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let resolved = open_local(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved.path(), path.as_path());
    }
}
