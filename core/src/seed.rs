//! Baseline volume content
//!
//! Each file is created (or emptied), written, closed, then read back and
//! compared before the next one is written.

use embedded_io::Read;
use hal_abstractions::{ContentSeeder, OpenMode, StorageError, Volume};
use heapless::String;

use crate::logger::write_fully;

/// Longest absolute path the seeder builds
pub const MAX_PATH: usize = 64;

const INDEX_HTML: &str = "<!DOCTYPE html>\r\n\
<html><head><title>NTC sensor node</title></head>\r\n\
<body><h1>NTC sensor node</h1>\r\n\
<p>Readings are logged once a minute to logfile.txt on the RAM volume.</p>\r\n\
</body></html>\r\n";

const README: &str = "NTC sensor node RAM volume\r\n\
logfile.txt  one line per minute: day/month/year,hh:mm:ss,celsius\r\n\
web/         pages served over HTTP\r\n";

/// Default file set: a web root page and a readme
pub const DEFAULT_FILES: &[(&str, &str)] = &[("/web/index.html", INDEX_HTML), ("/readme.txt", README)];

/// Seeds a fixed set of files, paths relative to the mount point
#[derive(Debug, Clone, Copy)]
pub struct StaticContent {
    files: &'static [(&'static str, &'static str)],
}

impl StaticContent {
    pub const fn new(files: &'static [(&'static str, &'static str)]) -> Self {
        Self { files }
    }
}

impl Default for StaticContent {
    fn default() -> Self {
        Self::new(DEFAULT_FILES)
    }
}

impl ContentSeeder for StaticContent {
    fn seed<V: Volume>(&mut self, volume: &V, mount: &str) -> Result<(), StorageError> {
        for &(relative, content) in self.files {
            let path = join(mount, relative)?;
            create(volume, &path, content.as_bytes())?;
            verify(volume, &path, content.as_bytes())?;
            debug!("seeded {} ({} bytes)", path.as_str(), content.len());
        }
        info!("{} file(s) seeded under {}", self.files.len(), mount);
        Ok(())
    }
}

fn join(mount: &str, relative: &str) -> Result<String<MAX_PATH>, StorageError> {
    let mut path = String::new();
    path.push_str(mount)
        .and_then(|_| path.push_str(relative))
        .map_err(|_| StorageError::InvalidPath)?;
    Ok(path)
}

fn create<V: Volume>(volume: &V, path: &str, content: &[u8]) -> Result<(), StorageError> {
    let mut file = volume.open(path, OpenMode::Truncate)?;
    let written = write_fully(&mut file, content);
    let closed = volume.close(file);
    written.and(closed)
}

fn verify<V: Volume>(volume: &V, path: &str, expected: &[u8]) -> Result<(), StorageError> {
    let mut file = volume.open(path, OpenMode::Read)?;
    let matched = read_matches(&mut file, expected);
    let closed = volume.close(file);

    if !matched? {
        warn!("seeded file {} reads back different content", path);
        return Err(StorageError::Io);
    }
    closed
}

fn read_matches<R: Read<Error = StorageError>>(
    file: &mut R,
    mut expected: &[u8],
) -> Result<bool, StorageError> {
    let mut chunk = [0u8; 32];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            return Ok(expected.is_empty());
        }
        if n > expected.len() || chunk[..n] != expected[..n] {
            return Ok(false);
        }
        expected = &expected[n..];
    }
}
