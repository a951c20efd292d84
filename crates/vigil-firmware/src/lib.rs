//! # vigil-firmware
//!
//! Helmet firmware on top of `vigil-edge`: a one-shot Initializer that turns
//! a model blob into a ready interpreter, and an Inference Loop that feeds
//! it one sensor frame per period and prints the result on a line channel.
//!
//! ```rust
//! use vigil_firmware::{demo, Firmware, FirmwareOptions, FixedInput, ManualClock, MemoryChannel};
//!
//! let mut fw = Firmware::new(
//!     FirmwareOptions::default(),
//!     MemoryChannel::new(),
//!     FixedInput::default(),
//!     ManualClock::new(),
//! );
//! fw.setup(&demo::echo_model_bytes(1.0).unwrap()).unwrap();
//! fw.run(Some(2)).unwrap();
//! assert_eq!(fw.channel().count("Model output: 1.00 1.10 0.90 "), 2);
//! ```

pub mod alert;
pub mod channel;
pub mod clock;
pub mod config;
pub mod demo;
pub mod error;
pub mod firmware;
pub mod inference;
pub mod init;
pub mod input;

pub use alert::{Alert, AlertKind, AlertLevel, DeviceInfo, HeartRateMonitor};
pub use channel::{LogChannel, MemoryChannel, SerialConsole};
pub use clock::{Cadence, Clock, ManualClock, MonotonicClock};
pub use config::FirmwareConfig;
pub use error::{ConfigError, CycleError, FirmwareError, InitError, InputError};
pub use firmware::{CycleReport, Firmware, FirmwareOptions, FirmwareState, RunSummary};
pub use inference::{run_cycle, CycleOutcome};
pub use init::{initialize, InferenceContext, InitOptions, ResolverProfile};
pub use input::{FixedInput, Frame, InputSource, LineInput, ScriptedInput, DEFAULT_FRAME, FRAME_LEN};
