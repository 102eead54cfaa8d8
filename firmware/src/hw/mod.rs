//! Board drivers behind the core's valve and pressure seams.
//!
//! Each muscle has one solenoid valve on a push-pull output and one pressure
//! transducer on an ADC1 input. Both muscles share the converter, so the
//! sensors hold a reference to a single `RefCell<Adc>` owned by the bridge
//! task.

use core::cell::RefCell;

use bridge_core::muscle::{PressureSensor, ValveDriver};
use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime};
use embassy_stm32::gpio::Output;
use embassy_stm32::peripherals::ADC1;

pub type SharedAdc = RefCell<Adc<'static, ADC1>>;

/// Solenoid valve driven high while energized.
pub struct ValveOutput<'d> {
    pin: Output<'d>,
}

impl<'d> ValveOutput<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl ValveDriver for ValveOutput<'_> {
    fn set_energized(&mut self, energized: bool) {
        if energized {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

/// Configures the shared converter for the transducers' source impedance.
pub fn configure_adc(mut adc: Adc<'static, ADC1>) -> Adc<'static, ADC1> {
    adc.set_sample_time(SampleTime::CYCLES160_5);
    adc
}

/// One transducer channel on the shared converter.
pub struct AdcPressureSensor<'a> {
    adc: &'a SharedAdc,
    channel: AnyAdcChannel<ADC1>,
    last: u16,
}

impl<'a> AdcPressureSensor<'a> {
    pub fn new(adc: &'a SharedAdc, channel: AnyAdcChannel<ADC1>) -> Self {
        Self {
            adc,
            channel,
            last: 0,
        }
    }
}

impl PressureSensor for AdcPressureSensor<'_> {
    fn read_raw(&mut self) -> u16 {
        // Only the bridge task touches the converter; a busy borrow repeats the last value.
        if let Ok(mut adc) = self.adc.try_borrow_mut() {
            self.last = adc.blocking_read(&mut self.channel);
        }
        self.last
    }
}
