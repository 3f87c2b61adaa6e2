use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;

/// Read-only access to registration log files.
///
/// The domain crate reads logs through this trait so confirmation logic can be
/// exercised against in-memory logs.
pub trait LogView {
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Read the whole file. Invalid UTF-8 is replaced, not rejected.
    fn read_to_string(&self, path: &Utf8Path) -> anyhow::Result<String>;
}

/// File-system backed `LogView`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLogView;

impl LogView for FsLogView {
    fn exists(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Utf8Path) -> anyhow::Result<String> {
        let bytes = fs::read(path).with_context(|| format!("read {}", path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
