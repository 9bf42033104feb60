#![deny(unsafe_code)]
//! RAM volume over a fixed arena
//!
//! A small flat file store: the arena is split into sectors, every file is
//! a chain of sectors linked through an in-RAM table, and the directory has
//! a fixed number of slots. Paths are `<mount>/<name>`; `<name>` may contain
//! further slashes and is stored verbatim.
//!
//! All state sits behind a `critical_section::Mutex`, so the logger task,
//! the HTTP server and the console can use the volume concurrently. Reads
//! hold the lock for at most one sector copy, appends for one record.
//! An append that does not fit is rejected whole, so a full volume never
//! ends a file in a torn record.

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::{info, warn};
use embedded_io::{ErrorType, Read, Write};
use hal_abstractions::{BlockStorage, OpenMode, RamDiskArena, StorageError, Volume};
use heapless::String;

/// Directory slots
pub const MAX_FILES: usize = 8;
/// Longest file name below the mount point
pub const MAX_NAME: usize = 48;
/// Largest sector count the chain table can describe
pub const MAX_SECTORS: usize = 128;

const FREE: u16 = u16::MAX - 1;
const END: u16 = u16::MAX;

struct Entry {
    name: String<MAX_NAME>,
    first: u16,
    last: u16,
    len: usize,
    handles: u8,
}

struct Disk {
    mount: &'static str,
    region: &'static mut [u8],
    sector_size: usize,
    sector_count: usize,
    next: [u16; MAX_SECTORS],
    files: [Option<Entry>; MAX_FILES],
}

impl Disk {
    fn name<'p>(&self, path: &'p str) -> Result<&'p str, StorageError> {
        let name = path
            .strip_prefix(self.mount)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or(StorageError::InvalidPath)?;
        if name.is_empty() || name.len() > MAX_NAME {
            return Err(StorageError::InvalidPath);
        }
        Ok(name)
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.files
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.name.as_str() == name))
    }

    fn create(&mut self, name: &str) -> Result<usize, StorageError> {
        let slot = self
            .files
            .iter()
            .position(Option::is_none)
            .ok_or(StorageError::TooManyFiles)?;
        let mut stored = String::new();
        stored
            .push_str(name)
            .map_err(|_| StorageError::InvalidPath)?;
        self.files[slot] = Some(Entry {
            name: stored,
            first: END,
            last: END,
            len: 0,
            handles: 0,
        });
        Ok(slot)
    }

    fn alloc(&mut self) -> Option<u16> {
        let index = self.next[..self.sector_count]
            .iter()
            .position(|&link| link == FREE)?;
        self.next[index] = END;
        Some(index as u16)
    }

    fn free_chain(&mut self, mut sector: u16) {
        while sector != END {
            let following = self.next[sector as usize];
            self.next[sector as usize] = FREE;
            sector = following;
        }
    }

    fn sector_at(&self, mut sector: u16, index: usize) -> Option<u16> {
        for _ in 0..index {
            if sector == END {
                return None;
            }
            sector = self.next[sector as usize];
        }
        (sector != END).then_some(sector)
    }

    fn entry(&mut self, slot: usize) -> Result<&mut Entry, StorageError> {
        self.files
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(StorageError::NotFound)
    }

    /// Append all of `data` to the file in `slot`, or nothing
    fn append(&mut self, slot: usize, data: &[u8]) -> Result<usize, StorageError> {
        let ss = self.sector_size;
        let (mut first, mut last, len) = {
            let e = self.entry(slot)?;
            (e.first, e.last, e.len)
        };
        let free = self.sector_count - self.used_sectors();
        if sectors_to_grow(len, data.len(), ss) > free {
            return Err(StorageError::NoSpace);
        }

        let mut written = 0;
        while written < data.len() {
            let within = (len + written) % ss;
            let sector = if within == 0 {
                let Some(new) = self.alloc() else {
                    break;
                };
                if first == END {
                    first = new;
                } else {
                    self.next[last as usize] = new;
                }
                last = new;
                new
            } else {
                last
            };

            let n = (ss - within).min(data.len() - written);
            let start = sector as usize * ss + within;
            self.region[start..start + n].copy_from_slice(&data[written..written + n]);
            written += n;
        }

        let e = self.entry(slot)?;
        e.first = first;
        e.last = last;
        e.len += written;
        Ok(written)
    }

    fn read_at(&mut self, slot: usize, pos: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        let ss = self.sector_size;
        let (first, len) = {
            let e = self.entry(slot)?;
            (e.first, e.len)
        };
        if pos >= len || buf.is_empty() {
            return Ok(0);
        }

        let sector = self.sector_at(first, pos / ss).ok_or(StorageError::Io)?;
        let within = pos % ss;
        let n = (ss - within).min(len - pos).min(buf.len());
        let start = sector as usize * ss + within;
        buf[..n].copy_from_slice(&self.region[start..start + n]);
        Ok(n)
    }

    fn used_sectors(&self) -> usize {
        self.next[..self.sector_count]
            .iter()
            .filter(|&&link| link != FREE)
            .count()
    }
}

/// Sectors a file of `len` bytes gains when `extra` bytes are appended
fn sectors_to_grow(len: usize, extra: usize, sector_size: usize) -> usize {
    (len + extra).div_ceil(sector_size) - len.div_ceil(sector_size)
}

/// The RAM volume driver; one static instance per arena
pub struct RamDisk {
    disk: Mutex<RefCell<Option<Disk>>>,
}

impl RamDisk {
    pub const fn new() -> Self {
        Self {
            disk: Mutex::new(RefCell::new(None)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Disk) -> Result<R, StorageError>) -> Result<R, StorageError> {
        critical_section::with(|cs| {
            let mut disk = self.disk.borrow(cs).borrow_mut();
            let disk = disk.as_mut().ok_or(StorageError::MountFailed)?;
            f(disk)
        })
    }

    fn mount(&self, mount: &'static str, arena: RamDiskArena) -> Result<(), StorageError> {
        let geometry = arena.geometry();
        if geometry.sector_count > MAX_SECTORS || geometry.sector_count > FREE as usize {
            return Err(StorageError::InvalidGeometry);
        }

        let region = arena.into_region();
        region.fill(0);
        let mut next = [END; MAX_SECTORS];
        next[..geometry.sector_count].fill(FREE);

        critical_section::with(|cs| {
            let mut slot = self.disk.borrow(cs).borrow_mut();
            if slot.is_some() {
                return Err(StorageError::MountFailed);
            }
            *slot = Some(Disk {
                mount,
                region,
                sector_size: geometry.sector_size,
                sector_count: geometry.sector_count,
                next,
                files: Default::default(),
            });
            Ok(())
        })
    }
}

impl Default for RamDisk {
    fn default() -> Self {
        Self::new()
    }
}

/// Mounts volumes on a [`RamDisk`]
pub struct RamStorage {
    disk: &'static RamDisk,
}

impl RamStorage {
    pub fn new(disk: &'static RamDisk) -> Self {
        Self { disk }
    }
}

impl BlockStorage for RamStorage {
    type Volume = RamVolume;

    fn init_volume(&mut self, name: &'static str, arena: RamDiskArena) -> Result<RamVolume, StorageError> {
        let geometry = arena.geometry();
        self.disk.mount(name, arena).inspect_err(|e| {
            warn!("RAM disk {} mount failed: {}", name, e);
        })?;
        info!(
            "RAM disk {} formatted: {} x {} bytes",
            name, geometry.sector_count, geometry.sector_size
        );
        Ok(RamVolume { disk: self.disk })
    }
}

/// Handle to the mounted RAM volume, freely copyable between tasks
#[derive(Clone, Copy)]
pub struct RamVolume {
    disk: &'static RamDisk,
}

impl RamVolume {
    /// Handle to `disk`, mounted or not; operations on an unmounted disk
    /// fail with [`StorageError::MountFailed`]
    pub fn new(disk: &'static RamDisk) -> Self {
        Self { disk }
    }

    /// (used, total) sectors
    pub fn usage(&self) -> Result<(usize, usize), StorageError> {
        self.disk.with(|d| Ok((d.used_sectors(), d.sector_count)))
    }

    /// Call `f` with the name and length of every file
    pub fn for_each_file(&self, mut f: impl FnMut(&str, usize)) -> Result<(), StorageError> {
        self.disk.with(|d| {
            for entry in d.files.iter().flatten() {
                f(entry.name.as_str(), entry.len);
            }
            Ok(())
        })
    }
}

impl Volume for RamVolume {
    type File = RamFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<RamFile, StorageError> {
        let slot = self.disk.with(|d| {
            let name = d.name(path)?;
            let slot = match (d.find(name), mode) {
                (Some(slot), OpenMode::Truncate) => {
                    let first = d.entry(slot)?.first;
                    d.free_chain(first);
                    let e = d.entry(slot)?;
                    e.first = END;
                    e.last = END;
                    e.len = 0;
                    slot
                }
                (Some(slot), _) => slot,
                (None, OpenMode::Read) => return Err(StorageError::NotFound),
                (None, _) => d.create(name)?,
            };
            let e = d.entry(slot)?;
            e.handles = e.handles.saturating_add(1);
            Ok(slot)
        })?;

        Ok(RamFile {
            disk: self.disk,
            slot,
            mode,
            pos: 0,
        })
    }

    fn close(&self, file: RamFile) -> Result<(), StorageError> {
        self.disk.with(|d| {
            let e = d.entry(file.slot)?;
            e.handles = e.handles.saturating_sub(1);
            Ok(())
        })
    }
}

/// Open file on the RAM volume
pub struct RamFile {
    disk: &'static RamDisk,
    slot: usize,
    mode: OpenMode,
    pos: usize,
}

impl ErrorType for RamFile {
    type Error = StorageError;
}

impl Read for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.mode != OpenMode::Read {
            return Err(StorageError::WrongMode);
        }
        let (slot, pos) = (self.slot, self.pos);
        let n = self.disk.with(|d| d.read_at(slot, pos, buf))?;
        self.pos += n;
        Ok(n)
    }
}

impl Write for RamFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        if self.mode == OpenMode::Read {
            return Err(StorageError::WrongMode);
        }
        let slot = self.slot;
        self.disk.with(|d| d.append(slot, buf))
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_cell::StaticCell;

    const SECTOR: usize = 16;

    fn disk(region: &'static mut [u8]) -> Disk {
        let sector_count = region.len() / SECTOR;
        let mut next = [END; MAX_SECTORS];
        next[..sector_count].fill(FREE);
        Disk {
            mount: "/ram",
            region,
            sector_size: SECTOR,
            sector_count,
            next,
            files: Default::default(),
        }
    }

    fn content(d: &mut Disk, slot: usize) -> ([u8; 64], usize) {
        let mut out = [0u8; 64];
        let mut pos = 0;
        loop {
            let n = d.read_at(slot, pos, &mut out[pos..]).unwrap();
            if n == 0 {
                return (out, pos);
            }
            pos += n;
        }
    }

    #[test]
    fn test_sectors_to_grow() {
        assert_eq!(sectors_to_grow(0, 0, SECTOR), 0);
        assert_eq!(sectors_to_grow(0, 1, SECTOR), 1);
        assert_eq!(sectors_to_grow(10, 6, SECTOR), 0);
        assert_eq!(sectors_to_grow(16, 1, SECTOR), 1);
        assert_eq!(sectors_to_grow(10, 30, SECTOR), 2);
    }

    #[test]
    fn test_append_that_does_not_fit_is_rejected_whole() {
        static REGION: StaticCell<[u8; 3 * SECTOR]> = StaticCell::new();
        let mut d = disk(REGION.init([0; 3 * SECTOR]));
        let slot = d.create("logfile.txt").unwrap();

        // 20 + 20 bytes use 3 sectors of 16
        assert_eq!(d.append(slot, b"29/2/2024,9:05,1.0\r\n"), Ok(20));
        assert_eq!(d.append(slot, b"29/2/2024,9:06,2.0\r\n"), Ok(20));
        // 8 bytes left in the last sector, the record needs 20
        assert_eq!(
            d.append(slot, b"29/2/2024,9:07,3.0\r\n"),
            Err(StorageError::NoSpace)
        );
        assert_eq!(d.entry(slot).unwrap().len, 40);

        let (bytes, len) = content(&mut d, slot);
        assert_eq!(len, 40);
        assert!(bytes[..len].ends_with(b"2.0\r\n"));

        // A record that fits the tail still goes in
        assert_eq!(d.append(slot, b"x\r\n"), Ok(3));
        assert_eq!(d.used_sectors(), 3);
    }
}
