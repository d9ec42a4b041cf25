//! Module client packs: the distribution interface for a module's
//! client-side assets. Callers ask for a module by name and get gzipped
//! tarball bytes back; an external module manager downloads and installs the
//! pack into its own plugin directory.

use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Request-by-name → archive-bytes boundary.
pub trait ModulePackStore: Send + Sync {
    /// The archive for `module_name`, or `None` when the module ships no
    /// client pack.
    ///
    /// # Errors
    /// Returns an I/O error when the pack exists but cannot be read.
    fn archive(&self, module_name: &str) -> std::io::Result<Option<Vec<u8>>>;
}

/// Filesystem store: packs are built on demand from
/// `<plugins_dir>/<root>/<module>/client/`, scanning roots in order.
pub struct FsPackStore {
    plugins_dir: PathBuf,
    roots: Vec<String>,
}

impl FsPackStore {
    #[must_use]
    pub fn new(plugins_dir: PathBuf, roots: Vec<String>) -> Self {
        Self { plugins_dir, roots }
    }

    fn client_dir(&self, module_name: &str) -> Option<PathBuf> {
        for root in &self.roots {
            let dir = self.plugins_dir.join(root).join(module_name).join("client");
            if dir.is_dir() {
                return Some(dir);
            }
        }
        None
    }
}

impl ModulePackStore for FsPackStore {
    fn archive(&self, module_name: &str) -> std::io::Result<Option<Vec<u8>>> {
        // The name becomes path segments below; reject anything that is not
        // a plain module identifier.
        if module_name.is_empty()
            || !module_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Ok(None);
        }
        let Some(dir) = self.client_dir(module_name) else {
            return Ok(None);
        };

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(module_name, &dir)?;
        let encoder = builder.into_inner()?;
        let bytes = encoder.finish()?;
        Ok(Some(bytes))
    }
}
