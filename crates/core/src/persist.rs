use std::path::{Path, PathBuf};

use serde::Serialize;
use snafu::ResultExt;

use crate::error::{
    CreateDirSnafu, RenameTempFileSnafu, SerializeSnafu, SettingsResult, WriteFileSnafu,
};

pub const CONFIG_DIRECTORY_NAME: &str = "hotprompt";

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|path| path.join(CONFIG_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".hotprompt"))
}

/// Writes `value` as pretty JSON through a temp file so readers never see a torn file.
pub(crate) fn write_json_atomically<T>(path: &Path, value: &T, what: &'static str) -> SettingsResult<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-config-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(value).context(SerializeSnafu {
        stage: "serialize-json",
        what,
    })?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteFileSnafu {
        stage: "write-temporary-file",
        path: temp_path.clone(),
    })?;

    std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
        stage: "rename-temporary-file",
        from: temp_path,
        to: path.to_path_buf(),
    })?;

    tracing::info!(path = ?path, what, "saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_json_and_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");

        write_json_atomically(&path, &vec![1, 2, 3], "numbers").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<Vec<u32>>(&content).unwrap(), vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
