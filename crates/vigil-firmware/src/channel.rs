//! Line-oriented log channel: the serial port on hardware, stdout on a host.

use std::io::{self, Write};

pub const SCHEMA_MISMATCH: &str = "Model schema version is not compatible!";
pub const MODEL_INVALID: &str = "Model blob could not be parsed";
pub const RESOLVER_FAILED: &str = "Op resolver setup failed";
pub const ALLOCATION_FAILED: &str = "Tensor allocation failed";
pub const SHAPE_UNSUPPORTED: &str = "Model tensors do not match the sensor frame";
pub const INVOCATION_FAILED: &str = "Model invocation failed";
pub const INPUT_FAILED: &str = "Sensor input unavailable";

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Startup line printed once before the Initializer runs.
pub fn banner(baud: u32) -> String {
    format!("Vigil model inference ({} baud)", baud)
}

/// `Model output: a b c ` with two decimals per value, the way a serial
/// print of floats renders them.
pub fn format_output(values: &[f32]) -> String {
    let mut line = String::from("Model output: ");
    for v in values {
        line.push_str(&format!("{:.2} ", v));
    }
    line
}

/// A sink that accepts whole lines of text.
pub trait LogChannel {
    fn write_line(&mut self, line: &str);
}

impl<C: LogChannel + ?Sized> LogChannel for &mut C {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line)
    }
}

/// Serial console over any writer. Write errors are logged and dropped:
/// the channel never stops the loop.
pub struct SerialConsole<W: Write> {
    out: W,
    baud: u32,
}

impl SerialConsole<io::Stdout> {
    pub fn stdout(baud: u32) -> Self {
        Self::new(io::stdout(), baud)
    }
}

impl<W: Write> SerialConsole<W> {
    pub fn new(out: W, baud: u32) -> Self {
        Self { out, baud }
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LogChannel for SerialConsole<W> {
    fn write_line(&mut self, line: &str) {
        let result = writeln!(self.out, "{}", line).and_then(|_| self.out.flush());
        if let Err(e) = result {
            tracing::warn!(error = %e, "serial write failed");
        }
    }
}

/// Captures lines in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryChannel {
    lines: Vec<String>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l == line)
    }

    pub fn count(&self, line: &str) -> usize {
        self.lines.iter().filter(|l| *l == line).count()
    }

    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl LogChannel for MemoryChannel {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_output_trailing_space() {
        assert_eq!(format_output(&[1.0, 0.126, -2.5]), "Model output: 1.00 0.13 -2.50 ");
    }

    #[test]
    fn test_serial_console_writes_lines() {
        let mut console = SerialConsole::new(Vec::new(), 9600);
        console.write_line(&banner(console.baud()));
        console.write_line(INVOCATION_FAILED);
        let text = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(text, "Vigil model inference (9600 baud)\nModel invocation failed\n");
    }

    #[test]
    fn test_memory_channel_through_reference() {
        let mut channel = MemoryChannel::new();
        {
            let mut by_ref = &mut channel;
            by_ref.write_line("a");
            by_ref.write_line("a");
        }
        assert_eq!(channel.count("a"), 2);
        assert_eq!(channel.take(), vec!["a".to_string(), "a".to_string()]);
        assert!(channel.lines().is_empty());
    }
}
