//! Wall-clock abstraction

/// Source of UTC wall-clock time
pub trait WallClock {
    /// Seconds since the Unix epoch (0 while the clock is unsynchronized)
    fn now(&self) -> u64;
}

impl<T: WallClock + ?Sized> WallClock for &T {
    fn now(&self) -> u64 {
        T::now(self)
    }
}
