//! Running the located installer

use std::path::Path;

use log::{debug, info};

use super::process::CommandRunner;
use crate::error::InstallError;

/// Run `installer` with `args` and return its combined output.
///
/// A non-zero exit is an error carrying the output.
pub fn install(
    runner: &dyn CommandRunner,
    installer: &Path,
    args: &[String],
) -> Result<String, InstallError> {
    info!("running installer: {}", installer.display());
    if !args.is_empty() {
        debug!("installer arguments: {args:?}");
    }

    let out = runner
        .run_program(installer, args)
        .map_err(|source| InstallError::Spawn {
            installer: installer.to_path_buf(),
            source,
        })?;

    if !out.success {
        return Err(InstallError::Failed {
            code: out.code,
            output: out.output,
        });
    }

    info!("installer finished: {}", installer.display());
    debug!("installer output: {}", out.output.trim());
    Ok(out.output)
}
