//! Element-wise binary operations on raw f32 slices.

use super::{check_same_numel, KernelError, OpParams, PrepareContext};

/// output[i] = a[i] + b[i]
pub fn add(a: &[f32], b: &[f32], output: &mut [f32]) {
    for i in 0..output.len() {
        output[i] = a[i] + b[i];
    }
}

/// output[i] = a[i] * b[i]
pub fn mul(a: &[f32], b: &[f32], output: &mut [f32]) {
    for i in 0..output.len() {
        output[i] = a[i] * b[i];
    }
}

/// Both operands and the output must hold the same number of elements.
pub fn prepare(ctx: &PrepareContext<'_>) -> Result<OpParams, KernelError> {
    ctx.expect_inputs(2, 2)?;
    check_same_numel(ctx.inputs[0], ctx.output())?;
    check_same_numel(ctx.inputs[1], ctx.output())?;
    Ok(OpParams::Elementwise {
        activation: ctx.activation()?,
    })
}

fn binary(
    inputs: &[&[f32]],
    output: &mut [f32],
    params: &OpParams,
    f: fn(&[f32], &[f32], &mut [f32]),
) -> Result<(), KernelError> {
    let (a, b) = (inputs[0], inputs[1]);
    for operand in [a, b] {
        if operand.len() != output.len() {
            return Err(KernelError::Length {
                expected: output.len(),
                found: operand.len(),
            });
        }
    }
    f(a, b, output);
    if let OpParams::Elementwise { activation } = params {
        activation.apply(output);
    }
    Ok(())
}

pub fn eval_add(inputs: &[&[f32]], output: &mut [f32], params: &OpParams) -> Result<(), KernelError> {
    binary(inputs, output, params, add)
}

pub fn eval_mul(inputs: &[&[f32]], output: &mut [f32], params: &OpParams) -> Result<(), KernelError> {
    binary(inputs, output, params, mul)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Activation;

    #[test]
    fn test_add() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let mut c = [0.0f32; 3];
        add(&a, &b, &mut c);
        assert_eq!(c, [5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_mul() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 2.0, -1.0];
        let mut c = [0.0f32; 3];
        mul(&a, &b, &mut c);
        assert_eq!(c, [2.0, 4.0, -3.0]);
    }

    #[test]
    fn test_eval_add_fused_relu() {
        let a = [1.0, -5.0];
        let b = [1.0, 1.0];
        let mut c = [0.0f32; 2];
        let params = OpParams::Elementwise {
            activation: Activation::Relu,
        };
        eval_add(&[&a, &b], &mut c, &params).unwrap();
        assert_eq!(c, [2.0, 0.0]);
    }

    #[test]
    fn test_eval_rejects_mismatched_operands() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0];
        let mut c = [0.0f32; 3];
        assert!(eval_mul(&[&a, &b], &mut c, &OpParams::None).is_err());
    }
}
