//! Direct invocation on a single local file, bypassing queue and storage.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::WorkerResult;
use crate::transform::Transform;

/// Transform `path` and write the output text to `out` exactly as produced.
///
/// No status is reported and nothing is uploaded.
pub fn run_headless(path: &Path, transform: &dyn Transform, out: &mut dyn Write) -> WorkerResult<()> {
    info!("Transforming '{}'", path.display());
    let output = transform.transform(path)?;
    out.write_all(output.as_bytes())?;
    out.flush()?;
    Ok(())
}
