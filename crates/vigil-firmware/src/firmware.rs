//! Firmware state machine: one `setup`, then `tick` at a fixed cadence.

use std::time::Duration;

use chrono::Utc;

use crate::alert::{Alert, AlertKind, AlertLevel, DeviceInfo, HeartRateMonitor};
use crate::channel::{self, LogChannel, DEFAULT_BAUD_RATE};
use crate::clock::{Cadence, Clock};
use crate::config::FirmwareConfig;
use crate::error::{CycleError, FirmwareError, InitError};
use crate::inference::{run_cycle, CycleOutcome};
use crate::init::{initialize, InferenceContext, InitOptions};
use crate::input::InputSource;

/// Module name reported in inference failure alerts.
pub const INFERENCE_MODULE: &str = "inference";

/// Everything `Firmware` needs besides its channel, input and clock.
#[derive(Debug, Clone)]
pub struct FirmwareOptions {
    pub init: InitOptions,
    pub interval: Duration,
    pub baud_rate: u32,
    pub device: DeviceInfo,
    pub heart_rate: HeartRateMonitor,
    pub failure_alert_after: u32,
}

impl Default for FirmwareOptions {
    fn default() -> Self {
        Self {
            init: InitOptions::default(),
            interval: Duration::from_millis(1000),
            baud_rate: DEFAULT_BAUD_RATE,
            device: DeviceInfo::default(),
            heart_rate: HeartRateMonitor::default(),
            failure_alert_after: 3,
        }
    }
}

impl From<&FirmwareConfig> for FirmwareOptions {
    fn from(config: &FirmwareConfig) -> Self {
        Self {
            init: config.init_options(),
            interval: config.interval(),
            baud_rate: config.baud_rate,
            device: config.device.clone(),
            heart_rate: config.heart_rate_monitor(),
            failure_alert_after: config.alerts.failure_alert_after,
        }
    }
}

#[derive(Debug)]
pub enum FirmwareState {
    Uninitialized,
    Ready(InferenceContext),
    Faulted(InitError),
}

/// Result of one `tick`.
#[derive(Debug)]
pub struct CycleReport {
    pub index: u64,
    /// Cycle start, measured from clock creation.
    pub start: Duration,
    pub latency: Duration,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub emitted: u64,
    pub skipped: u64,
}

pub struct Firmware<C, S, K> {
    channel: C,
    input: S,
    clock: K,
    cadence: Cadence,
    options: FirmwareOptions,
    state: FirmwareState,
    cycles: u64,
    failure_streak: u32,
}

impl<C: LogChannel, S: InputSource, K: Clock> Firmware<C, S, K> {
    pub fn new(options: FirmwareOptions, channel: C, input: S, clock: K) -> Self {
        Self {
            channel,
            input,
            clock,
            cadence: Cadence::new(options.interval),
            options,
            state: FirmwareState::Uninitialized,
            cycles: 0,
            failure_streak: 0,
        }
    }

    /// Print the banner and run the Initializer. Only the first call does
    /// anything; on failure the firmware stays faulted for good.
    pub fn setup(&mut self, blob: &[u8]) -> Result<(), FirmwareError> {
        if !matches!(self.state, FirmwareState::Uninitialized) {
            return Err(FirmwareError::AlreadyInitialized);
        }

        self.channel.write_line(&channel::banner(self.options.baud_rate));
        match initialize(blob, &self.options.init, &mut self.channel) {
            Ok(ctx) => {
                self.state = FirmwareState::Ready(ctx);
                Ok(())
            }
            Err(e) => {
                self.raise(
                    AlertLevel::NonCritical,
                    AlertKind::ModuleFailure {
                        module_name: INFERENCE_MODULE.to_string(),
                    },
                );
                self.state = FirmwareState::Faulted(e);
                Err(FirmwareError::SetupFailed)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, FirmwareState::Ready(_))
    }

    pub fn state(&self) -> &FirmwareState {
        &self.state
    }

    /// Why setup failed, if it did.
    pub fn fault(&self) -> Option<&InitError> {
        match &self.state {
            FirmwareState::Faulted(e) => Some(e),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&InferenceContext> {
        match &self.state {
            FirmwareState::Ready(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one cycle at its scheduled slot.
    ///
    /// Fails with `NotReady` without touching the clock or the input when
    /// setup has not succeeded.
    pub fn tick(&mut self) -> Result<CycleReport, FirmwareError> {
        let FirmwareState::Ready(ctx) = &mut self.state else {
            return Err(FirmwareError::NotReady);
        };

        let index = self.cycles;
        let _span = tracing::debug_span!("cycle", index).entered();
        let start = self.cadence.wait(&mut self.clock);

        let outcome = match self.input.next_frame() {
            Ok(frame) => run_cycle(ctx, &frame, &mut self.channel),
            Err(e) => {
                self.channel.write_line(channel::INPUT_FAILED);
                tracing::warn!(error = %e, "cycle skipped");
                CycleOutcome::Skipped(CycleError::Input(e))
            }
        };
        let latency = self.clock.elapsed().saturating_sub(start);

        self.track_failures(&outcome);
        self.cycles += 1;
        Ok(CycleReport {
            index,
            start,
            latency,
            outcome,
        })
    }

    /// Tick until `max_cycles` have run, or forever when `None`.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<RunSummary, FirmwareError> {
        let mut summary = RunSummary::default();
        while max_cycles.map_or(true, |max| summary.cycles < max) {
            let report = self.tick()?;
            summary.cycles += 1;
            if report.outcome.is_emitted() {
                summary.emitted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        tracing::info!(
            cycles = summary.cycles,
            emitted = summary.emitted,
            skipped = summary.skipped,
            "run finished"
        );
        Ok(summary)
    }

    /// Feed a heart-rate reading; raises an SOS alert when out of range.
    pub fn observe_heart_rate(&mut self, last_bpm: f32, avg_bpm: f32) -> Option<Alert> {
        let kind = self.options.heart_rate.check(last_bpm, avg_bpm)?;
        Some(self.raise(AlertLevel::Sos, kind))
    }

    /// Report a detected collision as an SOS alert.
    pub fn report_collision(&mut self, severity: &str) -> Alert {
        self.raise(
            AlertLevel::Sos,
            AlertKind::Collision {
                severity: severity.to_string(),
            },
        )
    }

    // Only invocation failures count; input gaps neither extend nor reset the streak.
    fn track_failures(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Emitted(_) => self.failure_streak = 0,
            CycleOutcome::Skipped(CycleError::Input(_)) => {}
            CycleOutcome::Skipped(_) => {
                self.failure_streak = self.failure_streak.saturating_add(1);
                let threshold = self.options.failure_alert_after;
                if threshold > 0 && self.failure_streak == threshold {
                    self.raise(
                        AlertLevel::NonCritical,
                        AlertKind::ModuleFailure {
                            module_name: INFERENCE_MODULE.to_string(),
                        },
                    );
                }
            }
        }
    }

    fn raise(&mut self, level: AlertLevel, kind: AlertKind) -> Alert {
        let alert = Alert::new(level, kind, &self.options.device, Utc::now());
        tracing::warn!(alert_level = alert.level.as_str(), kind = alert.kind.label(), "alert raised");
        self.channel.write_line(&alert.to_json_line());
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::clock::ManualClock;
    use crate::demo;
    use crate::input::FixedInput;

    fn firmware() -> Firmware<MemoryChannel, FixedInput, ManualClock> {
        Firmware::new(
            FirmwareOptions::default(),
            MemoryChannel::new(),
            FixedInput::default(),
            ManualClock::new(),
        )
    }

    #[test]
    fn test_tick_before_setup() {
        let mut fw = firmware();
        assert_eq!(fw.tick().unwrap_err(), FirmwareError::NotReady);
        assert!(fw.channel().lines().is_empty());
        assert_eq!(fw.clock().elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_setup_runs_once() {
        let mut fw = firmware();
        let blob = demo::default_model_bytes().unwrap();
        fw.setup(&blob).unwrap();
        assert!(fw.is_ready());
        assert_eq!(fw.setup(&blob), Err(FirmwareError::AlreadyInitialized));
        assert_eq!(fw.channel().lines(), &["Vigil model inference (115200 baud)".to_string()]);
    }

    #[test]
    fn test_faulted_setup_alerts_and_stays_down() {
        let mut fw = firmware();
        assert_eq!(fw.setup(b"garbage blob bytes"), Err(FirmwareError::SetupFailed));
        assert!(matches!(fw.fault(), Some(InitError::Format(_))));
        let lines = fw.channel().lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("\"moduleName\":\"inference\""));
        assert_eq!(fw.tick().unwrap_err(), FirmwareError::NotReady);
        assert_eq!(fw.run(Some(5)), Err(FirmwareError::NotReady));
    }

    #[test]
    fn test_heart_rate_alert() {
        let mut fw = firmware();
        assert!(fw.observe_heart_rate(72.0, 70.0).is_none());
        let alert = fw.observe_heart_rate(30.0, 65.0).unwrap();
        assert_eq!(alert.level, AlertLevel::Sos);
        assert_eq!(fw.channel().lines().len(), 1);
    }

    #[test]
    fn test_collision_alert() {
        let mut fw = firmware();
        let alert = fw.report_collision("severe");
        assert_eq!(alert.message, "Severe collision detected!");
        assert!(fw.channel().lines()[0].contains("\"collisionSeverity\":\"severe\""));
    }

    #[test]
    fn test_failure_streak_saturates() {
        let mut fw = firmware();
        fw.failure_streak = u32::MAX - 1;
        let failed = || CycleOutcome::Skipped(CycleError::Invoke(vigil_edge::InvokeError::NotAllocated));
        fw.track_failures(&failed());
        fw.track_failures(&failed());
        assert_eq!(fw.failure_streak, u32::MAX);
        assert!(fw.channel().lines().is_empty());

        fw.track_failures(&CycleOutcome::Emitted(Default::default()));
        assert_eq!(fw.failure_streak, 0);
    }
}
