//! Platform filesystem operations used by the dispatcher.
//!
//! Unix: a file is executable when it is a regular file with any of the
//! `0o111` permission bits set, and a socket when its file type is a socket.
//! Elsewhere both are always false and mode changes are ignored.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

pub trait PlatformFileSystem: Send + Sync {
    fn supports_file_mode(&self) -> bool;

    fn is_executable(&self, path: &Path) -> io::Result<bool>;

    fn is_socket(&self, path: &Path) -> io::Result<bool>;

    /// Read the first byte so the virtualization layer hydrates the file.
    /// Empty files succeed.
    fn hydrate_file(&self, path: &Path) -> io::Result<()> {
        let mut buffer = [0u8; 1];
        let _bytes_read = File::open(path)?.read(&mut buffer)?;
        Ok(())
    }

    fn change_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn move_and_overwrite_file(&self, source: &Path, destination: &Path) -> io::Result<()> {
        fs::rename(source, destination)
    }

    fn create_hard_link(&self, new_link: &Path, existing: &Path) -> io::Result<()> {
        fs::hard_link(existing, new_link)
    }
}

/// Filesystem of the host the crate was compiled for.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFileSystem;

#[cfg(unix)]
impl PlatformFileSystem for NativeFileSystem {
    fn supports_file_mode(&self) -> bool {
        true
    }

    fn is_executable(&self, path: &Path) -> io::Result<bool> {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path)?;
        Ok(metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
    }

    fn is_socket(&self, path: &Path) -> io::Result<bool> {
        use std::os::unix::fs::FileTypeExt;
        Ok(fs::metadata(path)?.file_type().is_socket())
    }

    fn change_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
}

#[cfg(not(unix))]
impl PlatformFileSystem for NativeFileSystem {
    fn supports_file_mode(&self) -> bool {
        false
    }

    fn is_executable(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn is_socket(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn change_mode(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Ok(())
    }
}
