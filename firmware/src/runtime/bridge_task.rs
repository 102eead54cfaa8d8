use embassy_time::{Duration, Ticker};

use bridge_core::bridge::{Bridge, BridgeConfig, BridgeError};
use bridge_core::waveform::{EmissionPolicy, EventGenerator, StopSignal, WaveformParams};

use super::{FirmwareMuscles, STATUS_PERIOD_TICKS, TICK_PERIOD_US};
use crate::clock;
use crate::link::UartQueues;
use crate::status;
use crate::telemetry::{self, TelemetryCursor};

/// Stimulus waveform: amplitude 50 at 1 Hz, running until stopped.
const WAVE_AMPLITUDE: f32 = 50.0;
const WAVE_FREQUENCY_HZ: f32 = 1.0;

#[embassy_executor::task]
pub async fn run(
    queues: &'static UartQueues,
    stop: &'static StopSignal,
    muscles: FirmwareMuscles,
    config: BridgeConfig,
) -> ! {
    let params = WaveformParams::new(WAVE_AMPLITUDE, WAVE_FREQUENCY_HZ, 0.0, None);
    let generator = match EventGenerator::configure(params, EmissionPolicy::default(), stop) {
        Ok(generator) => generator,
        Err(err) => {
            defmt::error!("bridge: {}", defmt::Display2Format(&err));
            park().await
        }
    };

    let mut bridge = Bridge::new(queues.link(), generator, muscles, config);
    let mut cursor = TelemetryCursor::new();
    let mut ticker = Ticker::every(Duration::from_micros(TICK_PERIOD_US));

    loop {
        let now = clock::now();
        match bridge.tick(now) {
            Ok(report) => {
                for dispatched in &report.outcomes {
                    defmt::info!("muscle: {}", defmt::Display2Format(&dispatched.outcome));
                }
            }
            Err(BridgeError::Halted) => {
                defmt::error!("bridge: halted after link fault");
                park().await
            }
            Err(err) => defmt::warn!("bridge: {}", defmt::Display2Format(&err)),
        }

        for (id, channel) in bridge.muscles().iter() {
            status::record_valve(id.0, channel.valve_energized());
        }
        status::record_bridge(bridge.phase(), bridge.stats(), now);
        cursor.drain(bridge.telemetry());

        if bridge.stats().ticks % STATUS_PERIOD_TICKS == 0 {
            telemetry::log_status(&status::snapshot(now));
        }

        ticker.next().await;
    }
}

async fn park() -> ! {
    loop {
        core::future::pending::<()>().await;
    }
}
