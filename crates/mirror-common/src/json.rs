/// JSON artifact I/O shared by every manifest and index type.
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CommonError;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CommonError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CommonError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| CommonError::json(path, e))
}

/// Write `value` as pretty JSON with a trailing newline.
///
/// The body goes to a sibling `.tmp` file first and is renamed into place, so readers
/// never observe a half-written artifact.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CommonError> {
    let mut body = serde_json::to_string_pretty(value).map_err(|e| CommonError::json(path, e))?;
    body.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CommonError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, body).map_err(|e| CommonError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CommonError::io(path, e))
}
