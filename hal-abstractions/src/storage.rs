//! Block storage and volume abstraction
//!
//! A volume is created once at boot over a caller-owned memory arena
//! ([`RamDiskArena`]) and then shared by every task that needs files.
//! Files are opened and closed per operation; the volume serializes
//! concurrent access internally.

use embedded_io::{ErrorKind, ErrorType, Read, Write};

/// Storage collaborator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Arena size or geometry is inconsistent
    InvalidGeometry,
    /// Volume could not be mounted on the arena
    MountFailed,
    /// No file at the given path
    NotFound,
    /// Path is empty or too long
    InvalidPath,
    /// Every file slot is in use
    TooManyFiles,
    /// The file reached its capacity
    NoSpace,
    /// Operation not permitted by the open mode
    WrongMode,
    /// Low-level I/O failure
    Io,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidGeometry => write!(f, "invalid volume geometry"),
            Self::MountFailed => write!(f, "volume mount failed"),
            Self::NotFound => write!(f, "file not found"),
            Self::InvalidPath => write!(f, "invalid path"),
            Self::TooManyFiles => write!(f, "too many files"),
            Self::NoSpace => write!(f, "no space left"),
            Self::WrongMode => write!(f, "operation not allowed in open mode"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for StorageError {}

impl embedded_io::Error for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidPath | Self::InvalidGeometry => ErrorKind::InvalidInput,
            Self::NoSpace | Self::TooManyFiles => ErrorKind::OutOfMemory,
            Self::WrongMode => ErrorKind::PermissionDenied,
            _ => ErrorKind::Other,
        }
    }
}

/// Fixed geometry of a RAM-backed volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VolumeGeometry {
    /// Bytes per sector
    pub sector_size: usize,
    /// Number of sectors in the arena
    pub sector_count: usize,
    /// I/O manager cache, in bytes
    pub cache_size: usize,
}

impl VolumeGeometry {
    /// Arena length required by this geometry
    pub const fn region_len(&self) -> usize {
        self.sector_size * self.sector_count
    }

    /// Check the geometry is usable
    ///
    /// Sector size must be a non-zero power of two, the volume must have at
    /// least one sector and the cache must hold a whole number of sectors,
    /// at least two.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() || self.sector_count == 0
        {
            return Err(StorageError::InvalidGeometry);
        }
        if self.cache_size % self.sector_size != 0 || self.cache_size < 2 * self.sector_size {
            return Err(StorageError::InvalidGeometry);
        }
        Ok(())
    }
}

/// Memory region backing a RAM volume, sized at configuration time
///
/// The arena is owned by whoever builds the boot sequence and moved into the
/// storage driver when the volume is created.
#[derive(Debug)]
pub struct RamDiskArena {
    region: &'static mut [u8],
    geometry: VolumeGeometry,
}

impl RamDiskArena {
    /// Wrap `region` after checking it matches `geometry`
    pub fn new(region: &'static mut [u8], geometry: VolumeGeometry) -> Result<Self, StorageError> {
        geometry.validate()?;
        if region.len() != geometry.region_len() {
            return Err(StorageError::InvalidGeometry);
        }
        Ok(Self { region, geometry })
    }

    pub fn geometry(&self) -> VolumeGeometry {
        self.geometry
    }

    /// Give up the arena, returning the raw region
    pub fn into_region(self) -> &'static mut [u8] {
        self.region
    }
}

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Read from the start; the file must exist
    Read,
    /// Write at the end, creating the file if needed
    Append,
    /// Create or empty the file, then write from the start
    Truncate,
}

/// Creates volumes over RAM arenas
pub trait BlockStorage {
    type Volume: Volume;

    /// Format and mount a volume named `name` over `arena`
    fn init_volume(
        &mut self,
        name: &'static str,
        arena: RamDiskArena,
    ) -> Result<Self::Volume, StorageError>;
}

/// Mounted volume
pub trait Volume {
    /// Open file handle
    type File: Read + Write + ErrorType<Error = StorageError>;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File, StorageError>;

    /// Flush and release `file`
    fn close(&self, file: Self::File) -> Result<(), StorageError>;
}

impl<T: Volume + ?Sized> Volume for &T {
    type File = T::File;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File, StorageError> {
        T::open(self, path, mode)
    }

    fn close(&self, file: Self::File) -> Result<(), StorageError> {
        T::close(self, file)
    }
}

/// Populates a freshly mounted volume with its baseline content
pub trait ContentSeeder {
    fn seed<V: Volume>(&mut self, volume: &V, mount: &str) -> Result<(), StorageError>;
}
