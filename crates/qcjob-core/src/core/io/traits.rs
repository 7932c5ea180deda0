use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Parsed output of one backend run.
///
/// The engine treats the content as opaque; it only forwards whatever the
/// backend's [`OutputParser`] produced together with the artifact location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendResult {
    pub backend: String,
    /// The output artifact the result was parsed from.
    pub artifact: PathBuf,
    pub total_energy: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read output artifact '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed output in '{path}': {message}", path = path.display())]
    Malformed { path: PathBuf, message: String },
}

/// Writes a program-specific input deck into a directory.
///
/// Implementations must be idempotent and must not depend on scheduler state.
pub trait InputDeckWriter: Send + Sync {
    /// Writes the deck into `dir` and returns the path of the written input artifact.
    fn write(&self, dir: &Path) -> io::Result<PathBuf>;
}

/// Turns a backend's output artifact into a [`BackendResult`].
pub trait OutputParser: Send + Sync {
    fn parse(&self, backend: &str, artifact: &Path) -> Result<BackendResult, ParseError>;
}

/// Fallback parser used when no program-specific parser is registered: it only
/// checks that the artifact is readable and records its location.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactParser;

impl OutputParser for ArtifactParser {
    fn parse(&self, backend: &str, artifact: &Path) -> Result<BackendResult, ParseError> {
        std::fs::metadata(artifact).map_err(|e| ParseError::Io {
            path: artifact.to_path_buf(),
            source: e,
        })?;
        Ok(BackendResult {
            backend: backend.to_string(),
            artifact: artifact.to_path_buf(),
            total_energy: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn artifact_parser_records_existing_artifact() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("h2.out");
        std::fs::write(&out, "TOTAL ENERGY = -1.17\n").unwrap();

        let result = ArtifactParser.parse("cpmd", &out).unwrap();
        assert_eq!(result.backend, "cpmd");
        assert_eq!(result.artifact, out);
        assert_eq!(result.total_energy, None);
    }

    #[test]
    fn artifact_parser_fails_on_missing_artifact() {
        let dir = tempdir().unwrap();
        let result = ArtifactParser.parse("vasp", &dir.path().join("vasprun.xml"));
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }
}
