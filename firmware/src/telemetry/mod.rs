#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Mirrors bridge telemetry to defmt on the target and stdout on the host.
//!
//! The bridge records into its own ring; [`TelemetryCursor`] remembers the last
//! record it forwarded so each tick logs only what is new.

use bridge_core::clock::MicrosInstant;
use bridge_core::telemetry::{EventId, TelemetryEventKind, TelemetryPayload, TelemetryRecord};
use bridge_core::waveform::Polarity;

use crate::status::StatusSnapshot;

pub type FirmwareRecorder = bridge_core::telemetry::TelemetryRecorder<MicrosInstant>;

/// Tracks which telemetry records have already been logged.
pub struct TelemetryCursor {
    next: EventId,
}

impl TelemetryCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Logs every record added since the previous call and returns the count.
    pub fn drain(&mut self, recorder: &FirmwareRecorder) -> usize {
        let mut logged = 0;
        for record in recorder.records_since(self.next) {
            log_record(record);
            logged += 1;
        }
        self.next = recorder.next_event_id();
        logged
    }
}

impl Default for TelemetryCursor {
    fn default() -> Self {
        Self::new()
    }
}

fn log_record(record: &TelemetryRecord<MicrosInstant>) {
    if let (TelemetryEventKind::PressureSampled(channel), TelemetryPayload::Pressure(pressure)) =
        (record.event, record.details)
    {
        emit_pressure(
            channel.0,
            record.timestamp.as_micros(),
            pressure.average_milli,
            pressure.gradient_milli,
        );
        return;
    }

    emit_log(
        kind_label(record.event),
        channel_index(record.event),
        record.timestamp.as_micros(),
        detail_value(record.details),
    );
}

/// Periodic status line.
pub fn log_status(snapshot: &StatusSnapshot) {
    emit_status(snapshot);
}

const fn kind_label(kind: TelemetryEventKind) -> &'static str {
    match kind {
        TelemetryEventKind::SpikeEmitted(Polarity::Positive) => "spike+",
        TelemetryEventKind::SpikeEmitted(Polarity::Negative) => "spike-",
        TelemetryEventKind::PulseStarted(_) => "pulse-start",
        TelemetryEventKind::PulseEnded(_) => "pulse-end",
        TelemetryEventKind::ValveOpened(_) => "valve-open",
        TelemetryEventKind::ValveClosed(_) => "valve-close",
        TelemetryEventKind::PulsingEnabled(_) => "pulsing-on",
        TelemetryEventKind::PulsingDisabled(_) => "pulsing-off",
        TelemetryEventKind::FrequencyChanged(_) => "frequency",
        TelemetryEventKind::PressureSampled(_) => "pressure",
        TelemetryEventKind::CommandIgnored => "ignored",
        TelemetryEventKind::EventDropped => "dropped",
        TelemetryEventKind::StartHandshake => "handshake",
        TelemetryEventKind::GeneratorStopped => "generator-stop",
        TelemetryEventKind::Custom(_) => "custom",
    }
}

const fn channel_index(kind: TelemetryEventKind) -> Option<u8> {
    match kind {
        TelemetryEventKind::PulseStarted(channel)
        | TelemetryEventKind::PulseEnded(channel)
        | TelemetryEventKind::ValveOpened(channel)
        | TelemetryEventKind::ValveClosed(channel)
        | TelemetryEventKind::PulsingEnabled(channel)
        | TelemetryEventKind::PulsingDisabled(channel)
        | TelemetryEventKind::FrequencyChanged(channel)
        | TelemetryEventKind::PressureSampled(channel) => Some(channel.0),
        _ => None,
    }
}

/// Single numeric detail per payload: gaps and hold times in µs, frequency in mHz.
fn detail_value(payload: TelemetryPayload) -> Option<u64> {
    match payload {
        TelemetryPayload::Spike(spike) => spike.elapsed_since_previous.map(duration_micros),
        TelemetryPayload::Pulse(pulse) => pulse.held_for.map(duration_micros),
        TelemetryPayload::Frequency(frequency) => Some(u64::from(frequency.millihertz)),
        TelemetryPayload::Fault(fault) => Some(u64::from(fault.dropped_total)),
        TelemetryPayload::Handshake(handshake) => Some(u64::from(handshake.discarded)),
        TelemetryPayload::Pressure(pressure) => u64::try_from(pressure.average_milli).ok(),
        TelemetryPayload::Ignored(_) | TelemetryPayload::None => None,
    }
}

fn duration_micros(duration: core::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(target_os = "none")]
fn emit_log(label: &'static str, channel: Option<u8>, timestamp_us: u64, detail: Option<u64>) {
    match (channel, detail) {
        (Some(channel), Some(detail)) => {
            defmt::info!("telemetry:{} ch{} t={}us d={}", label, channel, timestamp_us, detail);
        }
        (Some(channel), None) => {
            defmt::info!("telemetry:{} ch{} t={}us", label, channel, timestamp_us);
        }
        (None, Some(detail)) => {
            defmt::info!("telemetry:{} t={}us d={}", label, timestamp_us, detail);
        }
        (None, None) => defmt::info!("telemetry:{} t={}us", label, timestamp_us),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(label: &'static str, channel: Option<u8>, timestamp_us: u64, detail: Option<u64>) {
    match (channel, detail) {
        (Some(channel), Some(detail)) => {
            println!("telemetry:{label} ch{channel} t={timestamp_us}us d={detail}");
        }
        (Some(channel), None) => println!("telemetry:{label} ch{channel} t={timestamp_us}us"),
        (None, Some(detail)) => println!("telemetry:{label} t={timestamp_us}us d={detail}"),
        (None, None) => println!("telemetry:{label} t={timestamp_us}us"),
    }
}

/// Pressure values are thousandths of a raw ADC count; the gradient is signed.
#[cfg(target_os = "none")]
fn emit_pressure(channel: u8, timestamp_us: u64, average_milli: i32, gradient_milli: i32) {
    defmt::info!(
        "telemetry:pressure ch{} t={}us avg={}m grad={}m",
        channel,
        timestamp_us,
        average_milli,
        gradient_milli
    );
}

#[cfg(not(target_os = "none"))]
fn emit_pressure(channel: u8, timestamp_us: u64, average_milli: i32, gradient_milli: i32) {
    println!(
        "telemetry:pressure ch{channel} t={timestamp_us}us avg={average_milli}m grad={gradient_milli}m"
    );
}

#[cfg(target_os = "none")]
fn emit_status(snapshot: &StatusSnapshot) {
    defmt::info!(
        "status: running={} sent={} dropped={} applied={} ignored={} uart_errors={} valves={=u8:b}",
        snapshot.running,
        snapshot.events_sent,
        snapshot.events_dropped,
        snapshot.commands_applied,
        snapshot.commands_ignored,
        snapshot.uart_errors,
        snapshot.valve_mask
    );
}

#[cfg(not(target_os = "none"))]
fn emit_status(snapshot: &StatusSnapshot) {
    println!(
        "status: running={} sent={} dropped={} applied={} ignored={} uart_errors={} valves={:02b}",
        snapshot.running,
        snapshot.events_sent,
        snapshot.events_dropped,
        snapshot.commands_applied,
        snapshot.commands_ignored,
        snapshot.uart_errors,
        snapshot.valve_mask
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::muscle::{ChannelId, PressureReading};
    use bridge_core::telemetry::HandshakeTelemetry;

    fn at(micros: u64) -> MicrosInstant {
        MicrosInstant::from_micros(micros)
    }

    #[test]
    fn cursor_logs_each_record_once() {
        let mut recorder = FirmwareRecorder::new();
        let mut cursor = TelemetryCursor::new();

        recorder.record(
            TelemetryEventKind::StartHandshake,
            TelemetryPayload::Handshake(HandshakeTelemetry { discarded: 3 }),
            at(10),
        );
        recorder.record(
            TelemetryEventKind::PulseStarted(ChannelId(1)),
            TelemetryPayload::none(),
            at(20),
        );
        assert_eq!(cursor.drain(&recorder), 2);
        assert_eq!(cursor.drain(&recorder), 0);

        recorder.record(TelemetryEventKind::GeneratorStopped, TelemetryPayload::none(), at(30));
        assert_eq!(cursor.drain(&recorder), 1);
    }

    #[test]
    fn labels_carry_polarity_and_channel() {
        assert_eq!(
            kind_label(TelemetryEventKind::SpikeEmitted(Polarity::Negative)),
            "spike-"
        );
        assert_eq!(
            channel_index(TelemetryEventKind::ValveOpened(ChannelId(1))),
            Some(1)
        );
        assert_eq!(channel_index(TelemetryEventKind::EventDropped), None);
        assert_eq!(
            channel_index(TelemetryEventKind::PressureSampled(ChannelId(0))),
            Some(0)
        );
    }

    #[test]
    fn cursor_forwards_pressure_samples() {
        let mut recorder = FirmwareRecorder::new();
        let mut cursor = TelemetryCursor::new();
        let reading = PressureReading {
            now: 2_048.0,
            previous: 2_050.0,
            gradient: -2.0,
        };

        recorder.record_pressure(ChannelId(0), reading, at(100));
        recorder.record_pressure(ChannelId(1), reading, at(100));
        assert_eq!(cursor.drain(&recorder), 2);

        let latest = recorder.latest().copied().expect("record");
        assert_eq!(kind_label(latest.event), "pressure");
        assert_eq!(detail_value(latest.details), Some(2_048_000));
    }
}
