//! Sensor frame sources.
//!
//! The firmware reads one fixed-length frame per cycle. On the helmet this
//! would be the IMU; on a host it is a constant, a script or a line stream.

use std::io::BufRead;

use crate::error::InputError;

/// Values per sensor frame. Input and output tensors must both match it.
pub const FRAME_LEN: usize = 3;

pub type Frame = [f32; FRAME_LEN];

/// Placeholder reading used until a live feed is attached.
pub const DEFAULT_FRAME: Frame = [1.0, 1.1, 0.9];

pub trait InputSource {
    fn next_frame(&mut self) -> Result<Frame, InputError>;
}

impl<S: InputSource + ?Sized> InputSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, InputError> {
        (**self).next_frame()
    }
}

/// The same frame every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedInput(pub Frame);

impl Default for FixedInput {
    fn default() -> Self {
        FixedInput(DEFAULT_FRAME)
    }
}

impl InputSource for FixedInput {
    fn next_frame(&mut self) -> Result<Frame, InputError> {
        Ok(self.0)
    }
}

/// Cycles through a fixed list of frames.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    frames: Vec<Frame>,
    pos: usize,
}

impl ScriptedInput {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, pos: 0 }
    }
}

impl InputSource for ScriptedInput {
    fn next_frame(&mut self) -> Result<Frame, InputError> {
        if self.frames.is_empty() {
            return Err(InputError::Exhausted);
        }
        let frame = self.frames[self.pos % self.frames.len()];
        self.pos += 1;
        Ok(frame)
    }
}

/// One frame per line of text, values separated by commas or whitespace.
/// Blank lines are skipped.
pub struct LineInput<R: BufRead> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> InputSource for LineInput<R> {
    fn next_frame(&mut self) -> Result<Frame, InputError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Err(InputError::Exhausted);
            }
            self.line += 1;
            if !self.buf.trim().is_empty() {
                return parse_frame(&self.buf, self.line);
            }
        }
    }
}

/// Parse `a,b,c` (or `a b c`) into a frame.
pub fn parse_frame(text: &str, line: usize) -> Result<Frame, InputError> {
    let fields: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if fields.len() != FRAME_LEN {
        return Err(InputError::Arity {
            line,
            found: fields.len(),
        });
    }

    let mut frame = [0.0f32; FRAME_LEN];
    for (slot, field) in frame.iter_mut().zip(&fields) {
        let value: f32 = field.parse().map_err(|_| InputError::Parse {
            line,
            value: field.to_string(),
        })?;
        if !value.is_finite() {
            return Err(InputError::NonFinite { line, value });
        }
        *slot = value;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fixed_default() {
        let mut input = FixedInput::default();
        assert_eq!(input.next_frame().unwrap(), [1.0, 1.1, 0.9]);
        assert_eq!(input.next_frame().unwrap(), [1.0, 1.1, 0.9]);
    }

    #[test]
    fn test_scripted_wraps() {
        let mut input = ScriptedInput::new(vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let firsts: Vec<f32> = (0..5).map(|_| input.next_frame().unwrap()[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_scripted_empty() {
        let mut input = ScriptedInput::new(Vec::new());
        assert!(matches!(input.next_frame(), Err(InputError::Exhausted)));
    }

    #[test]
    fn test_parse_separators() {
        assert_eq!(parse_frame("1, 2.5 ,-3", 1).unwrap(), [1.0, 2.5, -3.0]);
        assert_eq!(parse_frame("1 2 3\n", 1).unwrap(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_frame("1,2", 4), Err(InputError::Arity { line: 4, found: 2 })));
        assert!(matches!(parse_frame("1,x,3", 2), Err(InputError::Parse { line: 2, .. })));
        assert!(matches!(parse_frame("1,inf,3", 1), Err(InputError::NonFinite { .. })));
    }

    #[test]
    fn test_line_input_skips_blank_and_ends() {
        let mut input = LineInput::new(Cursor::new("1,1,1\n\n2 2 2\nbad\n"));
        assert_eq!(input.next_frame().unwrap(), [1.0, 1.0, 1.0]);
        assert_eq!(input.next_frame().unwrap(), [2.0, 2.0, 2.0]);
        assert!(matches!(input.next_frame(), Err(InputError::Arity { line: 4, found: 1 })));
        assert!(matches!(input.next_frame(), Err(InputError::Exhausted)));
    }
}
