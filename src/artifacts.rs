use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::parser::components::ComponentMetadata;
use crate::routes::RouteEntry;

/// File listing + route table of the application tree.
pub const FILES_LIST_FILE: &str = "files-list.json";
/// Component registry.
pub const COMPONENTS_FILE: &str = "components.json";
/// Allocated ports.
pub const CONNECTION_FILE: &str = "connection.json";
/// Reload trigger observed by the proxy layer.
pub const RELOAD_FILE: &str = "reload.json";

/// Contents of [`FILES_LIST_FILE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesList {
    /// Project-relative, `/`-separated, sorted.
    pub files: Vec<String>,
    pub routes: Vec<RouteEntry>,
}

/// Contents of [`CONNECTION_FILE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub dev_port: u16,
    pub backend_port: u16,
}

/// What happened to the registry on a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryWrite {
    Written { count: usize },
    /// Zero components found while a registry already exists: kept as-is.
    SkippedEmpty,
}

/// Serialize `value` as pretty JSON into `dir/name` atomically.
///
/// Writes to a temp file in the same directory, then renames over the target,
/// so readers never observe a half-written artifact. Creates `dir` if needed.
pub fn write_json<T>(dir: &Path, name: &str, value: &T) -> anyhow::Result<PathBuf>
where
    T: Serialize + ?Sized,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact directory {}", dir.display()))?;

    let target = dir.join(name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().flush()?;
    tmp.persist(&target)
        .with_context(|| format!("failed to persist {}", target.display()))?;

    Ok(target)
}

/// Read a JSON artifact back. Returns `None` if it is missing or unreadable.
pub fn read_json<T: for<'de> Deserialize<'de>>(dir: &Path, name: &str) -> Option<T> {
    let bytes = std::fs::read(dir.join(name)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn write_files_list(dir: &Path, listing: &FilesList) -> anyhow::Result<PathBuf> {
    write_json(dir, FILES_LIST_FILE, listing)
}

pub fn write_connection_info(dir: &Path, info: &ConnectionInfo) -> anyhow::Result<PathBuf> {
    write_json(dir, CONNECTION_FILE, info)
}

/// Replace the component registry with `components`.
///
/// The previous registry is never merged into. An empty result does not
/// clobber an existing registry, so a transient empty scan keeps the last good one.
pub fn write_component_registry(
    dir: &Path,
    components: &[ComponentMetadata],
) -> anyhow::Result<RegistryWrite> {
    if components.is_empty() && dir.join(COMPONENTS_FILE).exists() {
        return Ok(RegistryWrite::SkippedEmpty);
    }
    write_json(dir, COMPONENTS_FILE, components)?;
    Ok(RegistryWrite::Written {
        count: components.len(),
    })
}
