use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::env;

/// Directory holding the running executable, symlinks resolved.
///
/// Persistent data is anchored here, never to the working directory or to
/// a temporary directory a self-extracting package unpacks into.
pub fn install_dir() -> Result<Utf8PathBuf> {
    let exe = env::current_exe().context("Failed to locate the running executable")?;
    let exe = exe
        .canonicalize()
        .with_context(|| format!("Failed to resolve executable path: {}", exe.display()))?;
    let exe = Utf8PathBuf::from_path_buf(exe)
        .map_err(|p| anyhow!("Executable path is not valid UTF-8: {}", p.display()))?;

    exe.parent()
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| anyhow!("Executable has no parent directory: {}", exe))
}

/// Anchor a possibly relative path to `base`.
pub fn resolve_against(base: &Utf8Path, path: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Anchor a user-supplied path to the current working directory.
///
/// Used for paths typed on the command line, which follow shell
/// conventions rather than the install-dir anchoring of settings.
pub fn from_working_dir(path: &Utf8Path) -> Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to read the working directory")?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow!("Working directory is not valid UTF-8: {}", p.display()))?;
    Ok(cwd.join(path))
}
