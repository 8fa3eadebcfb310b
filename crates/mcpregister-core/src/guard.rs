use crate::document::ConfigDocument;
use crate::error::RegisterEngineError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BACKUP_SUFFIX: &str = ".mcpregister-backup";

/// Wraps every config write in backup-before / reparse-after /
/// restore-on-failure. A process killed between the write and the cleanup
/// leaves a stale backup file behind; that window is accepted and the
/// backup suffix makes such files easy to spot.
pub struct WriteGuard;

impl WriteGuard {
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    pub fn write(path: &Path, content: &str) -> Result<(), RegisterEngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| RegisterEngineError::io(parent, error))?;
        }

        let backup_path = Self::backup_path(path);
        let had_original = path.is_file();
        if had_original {
            std::fs::copy(path, &backup_path)
                .map_err(|error| RegisterEngineError::io(&backup_path, error))?;
            debug!(path = %path.display(), "backed up config before write");
        }

        std::fs::write(path, content).map_err(|error| RegisterEngineError::io(path, error))?;

        match Self::validate(path) {
            Ok(()) => {
                if had_original {
                    let _ = std::fs::remove_file(&backup_path);
                }
                Ok(())
            }
            Err(detail) => {
                if had_original {
                    if let Err(restore_error) = std::fs::copy(&backup_path, path) {
                        warn!(
                            path = %path.display(),
                            error = %restore_error,
                            "failed to restore backup; backup file left in place"
                        );
                    } else {
                        let _ = std::fs::remove_file(&backup_path);
                    }
                } else {
                    let _ = std::fs::remove_file(path);
                }
                warn!(path = %path.display(), detail, "written config failed validation");
                Err(RegisterEngineError::ConfigWriteCorrupt {
                    path: path.to_path_buf(),
                    detail,
                })
            }
        }
    }

    pub fn delete(path: &Path) -> Result<(), RegisterEngineError> {
        std::fs::remove_file(path).map_err(|error| RegisterEngineError::io(path, error))
    }

    fn validate(path: &Path) -> Result<(), String> {
        let text = std::fs::read_to_string(path).map_err(|error| error.to_string())?;
        ConfigDocument::parse(&text)
            .map(|_| ())
            .map_err(|error| error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::WriteGuard;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn successful_write_leaves_no_backup() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, "{\n  \"a\": 1\n}\n").expect("seed");

        WriteGuard::write(&path, "{\n  \"a\": 2\n}\n").expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "{\n  \"a\": 2\n}\n");
        assert!(!WriteGuard::backup_path(&path).exists());
    }

    #[test]
    fn invalid_write_restores_original_exactly() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.json");
        let original = "{\n  \"a\": 1 // keep me\n}\n";
        fs::write(&path, original).expect("seed");

        let error = WriteGuard::write(&path, "{ not json at all").expect_err("must fail");
        assert_eq!(error.code(), "CONFIG_WRITE_CORRUPT");
        assert!(error.to_string().contains("restored"));

        assert_eq!(fs::read_to_string(&path).expect("read"), original);
        assert!(!WriteGuard::backup_path(&path).exists());
    }

    #[test]
    fn invalid_fresh_write_removes_the_file() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("config.json");

        let error = WriteGuard::write(&path, "nope").expect_err("must fail");
        assert_eq!(error.code(), "CONFIG_WRITE_CORRUPT");
        assert!(!path.exists());
    }

    #[test]
    fn write_creates_parent_directories() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join(".vscode").join("mcp.json");

        WriteGuard::write(&path, "{\n  \"servers\": {}\n}\n").expect("write");
        assert!(path.is_file());
    }
}
