use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::gpio::{Level, Output, Speed};
use static_cell::StaticCell;

use bridge_core::bridge::BridgeConfig;
use bridge_core::link::DEFAULT_BAUD_RATE;
use bridge_core::muscle::{MuscleChannel, MuscleConfig, MuscleGroup};
use bridge_core::waveform::StopSignal;

use crate::hw::{self, AdcPressureSensor, SharedAdc, ValveOutput};
use crate::link::UartQueues;

mod bridge_task;
mod uart_task;

/// Link baud rate; both peers are rated for 1 Mbaud.
const UART_BAUD: u32 = DEFAULT_BAUD_RATE;

/// Bridge scheduling period.
const TICK_PERIOD_US: u64 = 1_000;

/// Status line cadence, in ticks.
const STATUS_PERIOD_TICKS: u64 = 1_000;

/// Pressure sampling cadence, in ticks. Each sample is logged per channel.
const PRESSURE_PERIOD_TICKS: u32 = 100;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static UART_QUEUES: UartQueues = UartQueues::new();
pub(super) static STOP: StopSignal = StopSignal::new();
static ADC: StaticCell<SharedAdc> = StaticCell::new();

pub type FirmwareMuscles =
    MuscleGroup<ValveOutput<'static>, AdcPressureSensor<'static>, bridge_core::clock::MicrosInstant>;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PB10,
        PB11,
        PB13,
        PB14,
        ADC1,
        USART3,
        ..
    } = hal::init(config);

    let adc: &'static SharedAdc = ADC.init(SharedAdc::new(hw::configure_adc(Adc::new(ADC1))));

    let mut muscles = FirmwareMuscles::new();
    let channels = [
        (
            "left",
            Output::new(PA4, Level::Low, Speed::Low),
            PA0.degrade_adc(),
        ),
        (
            "right",
            Output::new(PA5, Level::Low, Speed::Low),
            PA1.degrade_adc(),
        ),
    ];
    for (name, valve, sensor) in channels {
        let channel = MuscleChannel::new(
            name,
            ValveOutput::new(valve),
            AdcPressureSensor::new(adc, sensor),
            MuscleConfig::default(),
        )
        .expect("default muscle configuration is valid");
        if muscles.push(channel).is_err() {
            defmt::warn!("muscle group full, {} not attached", name);
        }
    }

    spawner
        .spawn(uart_task::run(
            &UART_QUEUES,
            USART3,
            PB10,
            PB11,
            PB14,
            PB13,
        ))
        .expect("failed to spawn UART task");

    spawner
        .spawn(bridge_task::run(
            &UART_QUEUES,
            &STOP,
            muscles,
            BridgeConfig::new().with_pressure_interval(PRESSURE_PERIOD_TICKS),
        ))
        .expect("failed to spawn bridge task");

    core::future::pending::<()>().await;
}
