//! Files belonging to a submission and what happens to them.

use std::path::PathBuf;

/// A submission file materialized on local scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Position within the job's namespace, e.g. `src/main.c`
    pub relative_path: String,
    /// Where its bytes were downloaded to
    pub local_path: PathBuf,
}

impl SourceFile {
    pub fn new(relative_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            local_path: local_path.into(),
        }
    }

    /// Whether this file is run through the transform.
    ///
    /// Plain suffix match with no path-boundary check: with extension `src`,
    /// both `a.src` and `notes.xsrc` match.
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.relative_path.ends_with(extension)
    }

    /// Output path with the trailing `source` extension swapped for `target`.
    ///
    /// Paths that don't end with `source` are returned unchanged.
    pub fn output_path(&self, source: &str, target: &str) -> String {
        match self.relative_path.strip_suffix(source) {
            Some(stem) => format!("{}{}", stem, target),
            None => self.relative_path.clone(),
        }
    }
}

/// Result of processing a single file.
#[derive(Debug)]
pub enum TransformOutcome<E> {
    /// Non-source asset copied verbatim
    PassThrough(Vec<u8>),
    /// Output of the transform
    Transformed(String),
    /// The transform rejected the file
    Error(E),
}

impl<E> TransformOutcome<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformOutcome::PassThrough(_) => "pass_through",
            TransformOutcome::Transformed(_) => "transformed",
            TransformOutcome::Error(_) => "error",
        }
    }
}
