use crate::error::{BackendError, BackendOperation};
use crate::state::FileEntry;
use crate::transfer::{Cmd, TransferBackend};
use crate::util::{join_location, parent_dir};

/// Drives the `rclone` command line tool, which understands both local paths
/// and configured remotes (`drive:backup`).
#[derive(Debug, Clone)]
pub struct RcloneBackend {
    program: String,
}

impl RcloneBackend {
    pub fn new(program: &str) -> Self {
        RcloneBackend {
            program: program.to_owned(),
        }
    }

    fn cmd(&self) -> Cmd {
        Cmd::new(&self.program)
    }
}

impl Default for RcloneBackend {
    fn default() -> Self {
        RcloneBackend::new("rclone")
    }
}

/// Parses the output of `rclone lsjson`.
pub fn parse_listing(json: &str) -> Result<Vec<FileEntry>, serde_json::Error> {
    serde_json::from_str(json)
}

impl TransferBackend for RcloneBackend {
    fn list(&self, location: &str) -> Result<Vec<FileEntry>, BackendError> {
        info!("Listing {}", location);
        let output = self
            .cmd()
            .arg("lsjson")
            .arg("-R")
            .arg(location)
            .run()
            .map_err(|e| BackendError::new(BackendOperation::List, location, e))?;
        parse_listing(&output).map_err(|e| {
            BackendError::new(
                BackendOperation::List,
                location,
                format!("malformed listing: {}", e),
            )
        })
    }

    fn copy(&self, source: &str, path: &str, dest: &str) -> Result<(), BackendError> {
        let from = join_location(source, path);
        let to = join_location(dest, parent_dir(path));
        info!("Copying {} to {}", from, to);
        self.cmd()
            .arg("copy")
            .arg(from)
            .arg(to)
            .run()
            .map_err(|e| BackendError::new(BackendOperation::Copy, dest, e))?;
        Ok(())
    }

    fn delete(&self, location: &str, path: &str) -> Result<(), BackendError> {
        let target = join_location(location, path);
        info!("Deleting {}", target);
        self.cmd()
            .arg("deletefile")
            .arg(target)
            .run()
            .map_err(|e| BackendError::new(BackendOperation::Delete, location, e))?;
        Ok(())
    }

    fn version(&self) -> Result<String, BackendError> {
        self.cmd()
            .arg("version")
            .run()
            .map_err(|e| BackendError::new(BackendOperation::Version, &self.program, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lsjson_output() {
        let json = r#"[
            {"Path":"docs","Name":"docs","Size":-1,"MimeType":"inode/directory","ModTime":"2020-03-01T10:00:00Z","IsDir":true},
            {"Path":"docs/a.txt","Name":"a.txt","Size":12,"MimeType":"text/plain; charset=utf-8","ModTime":"2020-03-01T10:00:00.123456789+01:00","IsDir":false}
        ]"#;
        let entries = parse_listing(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].path, "docs/a.txt");
        assert_eq!(entries[1].size, 12);
    }

    #[test]
    fn rejects_malformed_listing() {
        assert!(parse_listing(r#"[{"Path":"a"}]"#).is_err());
        assert!(parse_listing("not json").is_err());
    }

    #[test]
    fn missing_program_is_a_backend_error() {
        let backend = RcloneBackend::new("definitely-not-rclone-4711");
        let err = backend.list("drive:").unwrap_err();
        assert_eq!(err.operation, BackendOperation::List);
        assert_eq!(err.location, "drive:");
    }
}
