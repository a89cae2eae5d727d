//! Disk-space preflight (§4.6 step 3): a small [`DiskProbe`] trait so the
//! Walker only depends on an interface, plus a `statvfs`-based Unix
//! default. Grounded on `examples/original_source/internal/disk/disk_bsd.go`'s
//! `GetInfo`.

use std::path::Path;

use anyhow::{Context, Result};

pub trait DiskProbe: Send + Sync {
    /// Bytes free on the filesystem containing `path`.
    fn free_bytes(&self, path: &Path) -> Result<u64>;
}

#[derive(Default)]
pub struct StatvfsDiskProbe;

impl DiskProbe for StatvfsDiskProbe {
    fn free_bytes(&self, path: &Path) -> Result<u64> {
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .with_context(|| format!("path {} contains a NUL byte", path.display()))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("statvfs failed for {}", path.display()));
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }
}

/// Per §4.6 step 3: extraction of an archive of `archive_size` bytes is
/// rejected unless free space is at least 5x that size.
pub fn has_headroom(probe: &dyn DiskProbe, dir: &Path, archive_size: u64) -> Result<bool> {
    let free = probe.free_bytes(dir)?;
    Ok(free > 5 * archive_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe(u64);

    impl DiskProbe for FakeProbe {
        fn free_bytes(&self, _path: &Path) -> Result<u64> {
            Ok(self.0)
        }
    }

    #[test]
    fn rejects_when_free_space_below_five_times_archive_size() {
        let probe = FakeProbe(1000);
        assert!(!has_headroom(&probe, Path::new("/tmp"), 500).unwrap());
    }

    #[test]
    fn accepts_when_free_space_exceeds_five_times_archive_size() {
        let probe = FakeProbe(10_000);
        assert!(has_headroom(&probe, Path::new("/tmp"), 500).unwrap());
    }

    #[test]
    fn real_statvfs_probe_returns_a_positive_number_for_tmp() {
        let probe = StatvfsDiskProbe;
        let free = probe.free_bytes(Path::new("/tmp")).unwrap();
        assert!(free > 0);
    }
}
