//! Export hosts - environment checks, the off-screen mount and delivery
//!
//! The off-screen mount is the one resource shared by every item of an
//! export. It is held through [`OffscreenMount`], which releases it on drop
//! so that early returns and panics unmount it too.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ExportError, ExportResult};
use crate::render::SurfaceSpec;

/// Where an archive ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub location: String,
    pub bytes: usize,
}

pub trait ExportHost {
    /// Fails with `EnvironmentUnsupported` when the host cannot render
    /// off-screen or deliver files.
    fn check_support(&self) -> ExportResult<()>;

    fn mount_offscreen(&self, surface: SurfaceSpec) -> ExportResult<()>;

    fn unmount_offscreen(&self);

    fn deliver(&self, archive_name: &str, bytes: &[u8]) -> ExportResult<Delivered>;
}

/// Scoped off-screen mount. Unmounts when dropped.
pub struct OffscreenMount<'a> {
    host: &'a dyn ExportHost,
}

impl<'a> OffscreenMount<'a> {
    pub fn attach(host: &'a dyn ExportHost, surface: SurfaceSpec) -> ExportResult<Self> {
        host.mount_offscreen(surface)?;
        Ok(Self { host })
    }
}

impl Drop for OffscreenMount<'_> {
    fn drop(&mut self) {
        self.host.unmount_offscreen();
    }
}

/// Rejects names that would escape the delivery directory.
pub fn validate_archive_name(archive_name: &str) -> ExportResult<()> {
    let trimmed = archive_name.trim();
    let plain = Path::new(trimmed)
        .file_name()
        .map_or(false, |name| name == trimmed);
    if trimmed.is_empty() || !plain || trimmed.contains(['/', '\\']) {
        return Err(ExportError::InvalidArchiveName(archive_name.to_string()));
    }
    Ok(())
}

/// Delivers archives into a directory on disk.
///
/// The archive is written to a temporary file next to its final name and
/// renamed into place, so readers never observe a partial archive.
pub struct DirectoryHost {
    out_dir: PathBuf,
    mounted: Cell<bool>,
}

impl DirectoryHost {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            mounted: Cell::new(false),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }
}

impl ExportHost for DirectoryHost {
    fn check_support(&self) -> ExportResult<()> {
        match fs::metadata(&self.out_dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ExportError::EnvironmentUnsupported(format!(
                "{} is not a directory",
                self.out_dir.display()
            ))),
            Err(e) => Err(ExportError::EnvironmentUnsupported(format!(
                "output directory {} is unavailable: {}",
                self.out_dir.display(),
                e
            ))),
        }
    }

    fn mount_offscreen(&self, surface: SurfaceSpec) -> ExportResult<()> {
        if self.mounted.replace(true) {
            return Err(ExportError::ExportInProgress);
        }
        debug!(width = surface.width, height = surface.height, "off-screen surface mounted");
        Ok(())
    }

    fn unmount_offscreen(&self) {
        self.mounted.set(false);
        debug!("off-screen surface unmounted");
    }

    fn deliver(&self, archive_name: &str, bytes: &[u8]) -> ExportResult<Delivered> {
        validate_archive_name(archive_name)?;
        let target = self.out_dir.join(archive_name.trim());

        let mut staged = NamedTempFile::new_in(&self.out_dir)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|e| ExportError::Io(e.error))?;

        info!(path = %target.display(), bytes = bytes.len(), "archive delivered");
        Ok(Delivered {
            location: target.display().to_string(),
            bytes: bytes.len(),
        })
    }
}

/// Keeps delivered archives in memory.
#[derive(Default)]
pub struct MemoryHost {
    unsupported: Option<String>,
    mounted: Cell<bool>,
    mount_count: Cell<usize>,
    delivered: RefCell<Vec<(String, Vec<u8>)>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that fails its environment check with `reason`.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            unsupported: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn mount_count(&self) -> usize {
        self.mount_count.get()
    }

    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.borrow().clone()
    }

    pub fn take_delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.take()
    }
}

impl ExportHost for MemoryHost {
    fn check_support(&self) -> ExportResult<()> {
        match &self.unsupported {
            Some(reason) => Err(ExportError::EnvironmentUnsupported(reason.clone())),
            None => Ok(()),
        }
    }

    fn mount_offscreen(&self, _surface: SurfaceSpec) -> ExportResult<()> {
        if self.mounted.replace(true) {
            return Err(ExportError::ExportInProgress);
        }
        self.mount_count.set(self.mount_count.get() + 1);
        Ok(())
    }

    fn unmount_offscreen(&self) {
        self.mounted.set(false);
    }

    fn deliver(&self, archive_name: &str, bytes: &[u8]) -> ExportResult<Delivered> {
        validate_archive_name(archive_name)?;
        self.delivered
            .borrow_mut()
            .push((archive_name.trim().to_string(), bytes.to_vec()));
        Ok(Delivered {
            location: format!("memory://{}", archive_name.trim()),
            bytes: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: SurfaceSpec = SurfaceSpec { width: 10, height: 10 };

    #[test]
    fn test_archive_name_rules() {
        assert!(validate_archive_name("out.zip").is_ok());
        assert!(validate_archive_name("重庆天气数据分析图表导出.zip").is_ok());
        assert!(validate_archive_name("").is_err());
        assert!(validate_archive_name("../out.zip").is_err());
        assert!(validate_archive_name("a/b.zip").is_err());
        assert!(validate_archive_name(r"a\b.zip").is_err());
        assert!(validate_archive_name("..").is_err());
    }

    #[test]
    fn test_mount_guard_unmounts_on_drop() {
        let host = MemoryHost::new();
        {
            let _mount = OffscreenMount::attach(&host, SURFACE).unwrap();
            assert!(host.is_mounted());
            assert!(matches!(
                OffscreenMount::attach(&host, SURFACE),
                Err(ExportError::ExportInProgress)
            ));
            assert!(host.is_mounted());
        }
        assert!(!host.is_mounted());
        assert_eq!(host.mount_count(), 1);
    }

    #[test]
    fn test_directory_host_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DirectoryHost::new(dir.path()).check_support().is_ok());

        let missing = DirectoryHost::new(dir.path().join("missing"));
        assert!(matches!(
            missing.check_support(),
            Err(ExportError::EnvironmentUnsupported(_))
        ));

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(DirectoryHost::new(&file).check_support().is_err());
    }

    #[test]
    fn test_directory_delivery_leaves_only_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(dir.path());

        let delivered = host.deliver("out.zip", b"PK-bytes").unwrap();
        assert_eq!(delivered.bytes, 8);
        assert_eq!(fs::read(dir.path().join("out.zip")).unwrap(), b"PK-bytes");

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.zip")]);
    }

    #[test]
    fn test_directory_delivery_overwrites_previous_archive() {
        let dir = tempfile::tempdir().unwrap();
        let host = DirectoryHost::new(dir.path());
        host.deliver("out.zip", b"old").unwrap();
        host.deliver("out.zip", b"new").unwrap();
        assert_eq!(fs::read(dir.path().join("out.zip")).unwrap(), b"new");
    }

    #[test]
    fn test_unsupported_memory_host() {
        let host = MemoryHost::unsupported("no display");
        let err = host.check_support().unwrap_err();
        assert_eq!(err.to_string(), "Export not supported by this host: no display");
    }
}
