//! Platform-agnostic task set of the NTC sensor node
//!
//! This crate contains the node's components: sampling, unit conversion,
//! durable logging, datagram publishing, boot sequencing, network-gated
//! service activation and the server work loop. It has NO hardware
//! dependencies; boards plug in through the `hal-abstractions` traits.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to every module
pub(crate) mod fmt;

pub mod activation;
pub mod boot;
pub mod calendar;
pub mod config;
pub mod convert;
pub mod error;
pub mod logger;
pub mod publisher;
pub mod sampler;
pub mod seed;
pub mod server;

#[cfg(test)]
mod mock;

pub use activation::{Activation, ActivationLatch, NetworkActivationGate};
pub use boot::{BootOrchestrator, Heartbeat};
pub use calendar::CalendarTime;
pub use config::{
    LoggerConfig, NodeConfig, PayloadFormat, PublisherConfig, ServiceConfig, StorageConfig,
    TransmitDiscipline,
};
pub use convert::{raw_to_celsius, Measurement, NtcCalibration};
pub use error::FatalError;
pub use logger::{LoggerState, LoggerStats, TelemetryLogger};
pub use publisher::{PublishOutcome, PublisherStats, TelemetryPublisher};
pub use sampler::{
    ChannelSelector, DedicatedSensor, Sample, SampleSource, SamplerError, SensorSampler,
    SharedSensor,
};
pub use seed::StaticContent;
pub use server::ServiceWorkLoop;
