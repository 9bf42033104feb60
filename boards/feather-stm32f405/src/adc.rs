#![deny(unsafe_code)]
//! Analog front-end on ADC1
//!
//! Conversion group 0 holds the two node inputs, converted in order:
//!
//! | channel | pin | input                        |
//! |---------|-----|------------------------------|
//! | 0       | PA4 | potentiometer (publisher)    |
//! | 1       | PA5 | NTC divider (logger)         |
//!
//! Conversions use the HAL's blocking read, which polls the end-of-conversion
//! flag.

use defmt::warn;
use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel, SampleTime};
use embassy_stm32::peripherals::ADC1;
use hal_abstractions::{AnalogFrontEnd, ChannelGroup};

/// The only conversion group wired on this board
pub const SENSOR_GROUP: ChannelGroup = ChannelGroup(0);

const FULL_SCALE_12BIT: u16 = 4095;

pub struct BoardAdc {
    adc: Adc<'static, ADC1>,
    channels: [AnyAdcChannel<ADC1>; 2],
}

impl BoardAdc {
    pub fn new(
        mut adc: Adc<'static, ADC1>,
        potentiometer: impl AdcChannel<ADC1>,
        ntc: impl AdcChannel<ADC1>,
    ) -> Self {
        // The NTC divider has a high source impedance
        adc.set_sample_time(SampleTime::CYCLES480);
        Self {
            adc,
            channels: [potentiometer.degrade_adc(), ntc.degrade_adc()],
        }
    }
}

impl AnalogFrontEnd for BoardAdc {
    fn full_scale(&self) -> u16 {
        FULL_SCALE_12BIT
    }

    fn convert(&mut self, group: ChannelGroup, results: &mut [u16]) -> usize {
        if group != SENSOR_GROUP {
            warn!("ADC group {} is not wired", group.0);
            return 0;
        }
        let mut converted = 0;
        for (slot, channel) in results.iter_mut().zip(self.channels.iter_mut()) {
            *slot = self.adc.blocking_read(channel);
            converted += 1;
        }
        converted
    }
}
