//! Upload screening and request-scoped temporary files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::image_io::extension_of;

/// One file as received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("no files were uploaded")]
    NoFiles,

    #[error("file `{file_name}` has no extension; allowed: {allowed}")]
    MissingExtension { file_name: String, allowed: String },

    #[error("file `{file_name}` has unsupported extension `{extension}`; allowed: {allowed}")]
    DisallowedExtension {
        file_name: String,
        extension: String,
        allowed: String,
    },

    #[error("file `{file_name}` is empty")]
    EmptyFile { file_name: String },
}

/// Checks a set of uploads against an extension allow-list.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    allowed_extensions: Vec<String>,
}

impl UploadValidator {
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Accepts the set only if it is non-empty and every file is a non-empty
    /// payload with an allowed extension.
    ///
    /// # Errors
    ///
    /// Returns the first reason the set is unacceptable.
    pub fn validate(&self, files: &[UploadedFile]) -> Result<(), UploadRejection> {
        if files.is_empty() {
            return Err(UploadRejection::NoFiles);
        }

        for file in files {
            let Some(extension) = extension_of(&file.file_name) else {
                return Err(UploadRejection::MissingExtension {
                    file_name: file.file_name.clone(),
                    allowed: self.allowed_list(),
                });
            };
            if !self.allows(&extension) {
                return Err(UploadRejection::DisallowedExtension {
                    file_name: file.file_name.clone(),
                    extension,
                    allowed: self.allowed_list(),
                });
            }
            if file.bytes.is_empty() {
                return Err(UploadRejection::EmptyFile {
                    file_name: file.file_name.clone(),
                });
            }
        }

        Ok(())
    }

    fn allowed_list(&self) -> String {
        self.allowed_extensions.join(", ")
    }
}

/// Directory where uploads live for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadArea {
    dir: PathBuf,
}

impl UploadArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes `bytes` under a fresh random name keeping `extension`.
    ///
    /// The file is removed when the returned guard drops.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the write fails.
    pub fn persist(&self, extension: &str, bytes: &[u8]) -> io::Result<TempFile> {
        fs::create_dir_all(&self.dir)?;

        let name = format!("{}.{}", Uuid::new_v4().simple(), extension.to_ascii_lowercase());
        let path = self.dir.join(name);
        let guard = TempFile { path };
        fs::write(&guard.path, bytes)?;

        debug!(path = %guard.path.display(), size = bytes.len(), "persisted upload");
        Ok(guard)
    }
}

/// A file that is deleted when dropped, on every exit path.
#[derive(Debug)]
#[must_use = "the file is deleted as soon as the guard is dropped"]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// Returns error if the file cannot be read back.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator::new(["jpg", "jpeg", "png", ".TIFF"])
    }

    #[test]
    fn rejects_empty_set() {
        assert_eq!(validator().validate(&[]), Err(UploadRejection::NoFiles));
    }

    #[test]
    fn accepts_allowed_extensions_case_insensitively() {
        let files = [
            UploadedFile::new("a.JPG", vec![1]),
            UploadedFile::new("b.png", vec![1]),
            UploadedFile::new("c.tiff", vec![1]),
        ];
        assert_eq!(validator().validate(&files), Ok(()));
    }

    #[test]
    fn rejects_disallowed_extension_with_reason() {
        let files = [
            UploadedFile::new("ok.png", vec![1]),
            UploadedFile::new("clip.gif", vec![1]),
        ];
        let err = validator().validate(&files).unwrap_err();
        assert!(matches!(&err, UploadRejection::DisallowedExtension { extension, .. } if extension == "gif"));
        assert!(err.to_string().contains("jpg, jpeg, png, tiff"));
    }

    #[test]
    fn rejects_missing_extension_and_empty_payload() {
        let v = validator();
        assert!(matches!(
            v.validate(&[UploadedFile::new("noext", vec![1])]),
            Err(UploadRejection::MissingExtension { .. })
        ));
        assert_eq!(
            v.validate(&[UploadedFile::new("e.png", Vec::new())]),
            Err(UploadRejection::EmptyFile { file_name: "e.png".into() })
        );
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let area = UploadArea::new(dir.path().join("uploads"));

        let file = area.persist("PNG", b"payload").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(file.read().unwrap(), b"payload");

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn temp_file_is_removed_when_request_fails() {
        let dir = tempfile::tempdir().unwrap();
        let area = UploadArea::new(dir.path());

        let failing = || -> io::Result<PathBuf> {
            let file = area.persist("jpg", b"x")?;
            let path = file.path().to_path_buf();
            Err(io::Error::other(path.display().to_string()))
        };
        let err = failing().unwrap_err();
        assert!(!Path::new(&err.to_string()).exists());
    }

    #[test]
    fn names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let area = UploadArea::new(dir.path());
        let a = area.persist("png", b"1").unwrap();
        let b = area.persist("png", b"2").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn already_deleted_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = UploadArea::new(dir.path()).persist("png", b"1").unwrap();
        fs::remove_file(file.path()).unwrap();
        drop(file);
    }
}
