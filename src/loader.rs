//! The host hook used to resolve `#include` paths. Swappable so embedders
//! can serve skeleton source from anywhere (a database, a bundled asset
//! archive, a virtual filesystem) instead of the real filesystem.

use std::fs;
use std::path::Path;

use crate::error::IoError;

pub trait Loader {
    fn read_file(&self, path: &Path) -> Result<String, IoError>;
}

/// Reads files directly from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl Loader for FsLoader {
    fn read_file(&self, path: &Path) -> Result<String, IoError> {
        fs::read_to_string(path).map_err(|e| IoError::new(path.to_path_buf(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        let loader = FsLoader;
        assert!(loader.read_file(Path::new("/nonexistent/skelform-test-file")).is_err());
    }
}
