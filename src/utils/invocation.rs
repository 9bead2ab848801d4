//! Identity hints derived from the name the binary was invoked under, and the
//! alias symlinks that produce them.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

/// Returns the invoked name when it differs from the real executable name,
/// i.e. when the tool was started through an alias symlink.
pub fn identity_hint(invoked_as: Option<&OsStr>, executable: Option<&Path>) -> Option<String> {
    let invoked = Path::new(invoked_as?).file_name()?.to_str()?.trim().to_string();
    let real = executable?.file_name()?.to_str()?.to_string();
    if invoked.is_empty() || invoked == real {
        return None;
    }
    Some(invoked)
}

/// Reads the process' own argv[0] and executable path. Only the binary entry
/// point calls this; everything below it receives the hint as a parameter.
pub fn current_identity_hint() -> Option<String> {
    let invoked = std::env::args_os().next();
    let executable = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok().or(Some(exe)));
    identity_hint(invoked.as_deref(), executable.as_deref())
}

pub fn alias_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok().or(Some(exe)))
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
    Removed(PathBuf),
    Absent,
    Unsupported,
}

#[cfg(unix)]
pub fn create_alias(dir: &Path, name: &str, target: &Path) -> io::Result<AliasOutcome> {
    let link = dir.join(name);
    if link.symlink_metadata().is_ok() {
        return Ok(AliasOutcome::AlreadyExists(link));
    }
    std::os::unix::fs::symlink(target, &link)?;
    Ok(AliasOutcome::Created(link))
}

#[cfg(not(unix))]
pub fn create_alias(_dir: &Path, _name: &str, _target: &Path) -> io::Result<AliasOutcome> {
    Ok(AliasOutcome::Unsupported)
}

/// Removes `dir/name` only if it is a symlink; regular files are left alone.
pub fn remove_alias(dir: &Path, name: &str) -> io::Result<AliasOutcome> {
    let link = dir.join(name);
    match link.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(&link)?;
            Ok(AliasOutcome::Removed(link))
        }
        _ => Ok(AliasOutcome::Absent),
    }
}
