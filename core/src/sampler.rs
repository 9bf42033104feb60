//! Sensor sampling
//!
//! [`SensorSampler`] owns the analog front-end. Tasks read through a
//! [`SampleSource`]: a [`DedicatedSensor`] when the task is the only
//! sampler, or a [`SharedSensor`] that serializes several tasks on one
//! sampler behind an async mutex.

use core::fmt;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use hal_abstractions::{AnalogFrontEnd, ChannelGroup, WallClock};

/// Largest number of channels converted in one group
pub const MAX_GROUP_CHANNELS: usize = 8;

/// One raw reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Converter code
    pub raw: u16,
    /// Largest code the converter can report
    pub raw_max: u16,
    /// Wall-clock time of the conversion, Unix seconds
    pub timestamp: u64,
}

/// A single channel within a conversion group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSelector {
    pub group: ChannelGroup,
    /// Index of the channel in the group's results
    pub channel: u8,
}

impl ChannelSelector {
    pub const fn new(group: u8, channel: u8) -> Self {
        Self {
            group: ChannelGroup(group),
            channel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplerError {
    /// The group converted fewer channels than the selector asks for
    ChannelOutOfRange { channel: u8, converted: u8 },
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelOutOfRange { channel, converted } => write!(
                f,
                "channel {} out of range ({} converted)",
                channel, converted
            ),
        }
    }
}

impl core::error::Error for SamplerError {}

/// Exclusive owner of the analog front-end
pub struct SensorSampler<A, C> {
    adc: A,
    clock: C,
}

impl<A: AnalogFrontEnd, C: WallClock> SensorSampler<A, C> {
    pub fn new(adc: A, clock: C) -> Self {
        Self { adc, clock }
    }

    /// Convert the selector's group and return its channel
    ///
    /// Blocks until the front-end completes the conversion.
    pub fn sample(&mut self, selector: ChannelSelector) -> Result<Sample, SamplerError> {
        let mut results = [0u16; MAX_GROUP_CHANNELS];
        let converted = self
            .adc
            .convert(selector.group, &mut results)
            .min(MAX_GROUP_CHANNELS);

        let raw = *results[..converted].get(selector.channel as usize).ok_or(
            SamplerError::ChannelOutOfRange {
                channel: selector.channel,
                converted: converted as u8,
            },
        )?;

        Ok(Sample {
            raw,
            raw_max: self.adc.full_scale(),
            timestamp: self.clock.now(),
        })
    }
}

/// Where a task gets its samples from
pub trait SampleSource {
    fn sample(&mut self) -> impl Future<Output = Result<Sample, SamplerError>>;
}

/// A sampler owned by a single task; no locking
pub struct DedicatedSensor<A, C> {
    sampler: SensorSampler<A, C>,
    selector: ChannelSelector,
}

impl<A: AnalogFrontEnd, C: WallClock> DedicatedSensor<A, C> {
    pub fn new(sampler: SensorSampler<A, C>, selector: ChannelSelector) -> Self {
        Self { sampler, selector }
    }
}

impl<A: AnalogFrontEnd, C: WallClock> SampleSource for DedicatedSensor<A, C> {
    async fn sample(&mut self) -> Result<Sample, SamplerError> {
        self.sampler.sample(self.selector)
    }
}

/// One channel of a sampler shared between tasks
///
/// Each conversion holds the mutex for its whole duration, so at most one
/// conversion is in flight.
pub struct SharedSensor<'a, M: RawMutex, A, C> {
    sampler: &'a Mutex<M, SensorSampler<A, C>>,
    selector: ChannelSelector,
}

impl<'a, M: RawMutex, A, C> SharedSensor<'a, M, A, C> {
    pub fn new(sampler: &'a Mutex<M, SensorSampler<A, C>>, selector: ChannelSelector) -> Self {
        Self { sampler, selector }
    }
}

impl<M: RawMutex, A: AnalogFrontEnd, C: WallClock> SampleSource for SharedSensor<'_, M, A, C> {
    async fn sample(&mut self) -> Result<Sample, SamplerError> {
        self.sampler.lock().await.sample(self.selector)
    }
}
