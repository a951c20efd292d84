//! The Inference Loop body: one cycle of write, invoke, read, emit.

use crate::channel::{self, LogChannel};
use crate::error::CycleError;
use crate::init::InferenceContext;
use crate::input::{Frame, FRAME_LEN};

/// What one cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The output frame that was printed.
    Emitted(Frame),
    /// Nothing was printed; the next cycle runs normally.
    Skipped(CycleError),
}

impl CycleOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, CycleOutcome::Emitted(_))
    }

    pub fn output(&self) -> Option<&Frame> {
        match self {
            CycleOutcome::Emitted(frame) => Some(frame),
            CycleOutcome::Skipped(_) => None,
        }
    }
}

impl InferenceContext {
    /// Run the model on one frame.
    ///
    /// The input tensor is fully overwritten first, so a failed previous
    /// cycle leaves nothing behind.
    pub fn infer(&mut self, frame: &Frame) -> Result<Frame, CycleError> {
        self.interpreter.write(self.input, frame)?;
        self.interpreter.invoke()?;

        let mut out = [0.0f32; FRAME_LEN];
        out.copy_from_slice(self.interpreter.read(self.output));
        Ok(out)
    }
}

/// One cycle: infer, then either print the output line or a diagnostic.
pub fn run_cycle<C: LogChannel + ?Sized>(
    ctx: &mut InferenceContext,
    frame: &Frame,
    channel: &mut C,
) -> CycleOutcome {
    match ctx.infer(frame) {
        Ok(output) => {
            channel.write_line(&channel::format_output(&output));
            tracing::debug!(?output, "cycle emitted");
            CycleOutcome::Emitted(output)
        }
        Err(e) => {
            channel.write_line(channel::INVOCATION_FAILED);
            tracing::warn!(error = %e, "cycle skipped");
            CycleOutcome::Skipped(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::demo;
    use crate::init::{initialize, InitOptions};

    fn echo_context(scale: f32) -> InferenceContext {
        let blob = demo::echo_model_bytes(scale).unwrap();
        initialize(&blob, &InitOptions::default(), &mut MemoryChannel::new()).unwrap()
    }

    #[test]
    fn test_echo_cycle_emits_scaled_input() {
        let mut ctx = echo_context(2.0);
        let mut channel = MemoryChannel::new();
        let outcome = run_cycle(&mut ctx, &[1.0, 1.1, 0.9], &mut channel);
        assert_eq!(outcome.output(), Some(&[2.0, 2.2, 1.8]));
        assert_eq!(channel.lines(), &["Model output: 2.00 2.20 1.80 ".to_string()]);
    }

    #[test]
    fn test_failed_cycle_then_recovery() {
        let mut ctx = echo_context(1.0);
        let mut channel = MemoryChannel::new();

        let bad = run_cycle(&mut ctx, &[f32::INFINITY, 0.0, 0.0], &mut channel);
        assert!(matches!(bad, CycleOutcome::Skipped(CycleError::Invoke(_))));

        let good = run_cycle(&mut ctx, &[1.0, 1.1, 0.9], &mut channel);
        assert_eq!(good.output(), Some(&[1.0, 1.1, 0.9]));
        assert_eq!(
            channel.lines(),
            &[
                channel::INVOCATION_FAILED.to_string(),
                "Model output: 1.00 1.10 0.90 ".to_string()
            ]
        );
    }
}
