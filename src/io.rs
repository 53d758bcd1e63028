use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{
    result::{bail, Error, Result},
    types::Extension,
};

/// Files this small are leftovers of an aborted transfer, not real recordings
const MIN_REAL_SIZE: u64 = 100;

const TEMP_SUFFIX: &str = ".tmp";

/// Where a fetched recording should be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Nothing worth keeping is at this path
    Free(PathBuf),
    /// A previous fetch already wrote this path
    Taken(PathBuf),
}

/// Whether a complete file is present at this path
pub fn is_real_file(path: &Path) -> bool {
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.len() > MIN_REAL_SIZE)
}

/// Find the path to write the recording to.
///
/// `base` is the output path without extension.
/// If `<base>.<ext>` already holds a real file, return it as [`Target::Taken`]
/// when `skip` is set, otherwise look for the first free `<base>.<n>.<ext>`.
pub fn find_target(base: &Path, extension: Extension, skip: bool) -> Result<Target> {
    let with_suffix = |suffix: &str| {
        let mut name = base.as_os_str().to_os_string();
        name.push(suffix);
        name.push(extension.with_dot());
        PathBuf::from(name)
    };

    // Format for 1st file: <base>.<ext>
    let output = with_suffix("");
    if !is_real_file(&output) {
        return Ok(Target::Free(output));
    }
    if skip {
        return Ok(Target::Taken(output));
    }

    // Format for 2nd file and up: <base>.<n>.<ext>
    for n in 1u16.. {
        let output = with_suffix(&format!(".{n}"));
        if !is_real_file(&output) {
            return Ok(Target::Free(output));
        }
    }

    bail("Code is broken or you have really REALLY too much files with the same name")
}

/// Path of the file receiving the transfer before it is complete.
///
/// It is a sibling of the target so that the final rename stays on the same filesystem,
/// and its suffix keeps it out of the names checked by [`find_target`].
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Create a private file where `curl` can keep the session cookies.
///
/// The file destructor will be called at the handle drop.
/// **As such, one must not simply get the file path and drop the handle.**
pub fn cookie_jar() -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("cookies")
        .tempfile()
        .map_err(|err| Error::filesystem("create a cookie jar in", std::env::temp_dir(), err))
}
