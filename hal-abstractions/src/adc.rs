//! Analog front-end abstraction

/// Conversion group on the analog front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelGroup(pub u8);

/// Analog-to-digital converter with a single in-flight conversion
///
/// `convert` starts a conversion of every channel in a group and returns
/// once the peripheral reports completion. Implementations are free to
/// busy-poll the completion flag. A peripheral that never completes blocks
/// the caller forever; there is no timeout at this layer.
pub trait AnalogFrontEnd {
    /// Largest code the converter can report (4095 for a 12-bit ADC)
    fn full_scale(&self) -> u16;

    /// Convert `group` and write one result per channel into `results`
    ///
    /// Returns the number of channels written, never more than
    /// `results.len()`.
    fn convert(&mut self, group: ChannelGroup, results: &mut [u16]) -> usize;
}
