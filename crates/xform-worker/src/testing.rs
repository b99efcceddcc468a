//! Helpers for testing transforms.

use std::path::Path;

use crate::transform::Transform;

/// Write `source` to a temporary `file_name`, run `transform` on it, and
/// assert the output matches `expected`.
///
/// Leading and trailing whitespace is ignored on both sides.
///
/// # Panics
/// When the transform fails or the output differs.
pub fn assert_transform(transform: &dyn Transform, file_name: &str, source: &str, expected: &str) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(Path::new(file_name));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, source.trim()).expect("write source file");

    let output = match transform.transform(&path) {
        Ok(output) => output,
        Err(e) => panic!("transform of '{}' failed: {}", file_name, e),
    };

    assert_eq!(
        output.trim(),
        expected.trim(),
        "unexpected output for '{}'",
        file_name
    );
}
