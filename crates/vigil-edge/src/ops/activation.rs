//! Activation functions on raw f32 slices.

use super::{check_same_numel, KernelError, OpParams, PrepareContext};

/// ReLU: x = max(0, x)
pub fn relu(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = v.max(0.0);
    }
}

/// ReLU6: x = min(max(0, x), 6)
pub fn relu6(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = v.clamp(0.0, 6.0);
    }
}

/// Logistic sigmoid: x = 1 / (1 + exp(-x))
pub fn logistic(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = 1.0 / (1.0 + (-*v).exp());
    }
}

pub fn tanh(data: &mut [f32]) {
    for v in data.iter_mut() {
        *v = v.tanh();
    }
}

/// Softmax over rows of shape [batch, dim] (in-place, numerically stable).
pub fn softmax(data: &mut [f32], dim: usize, beta: f32) {
    let batch = data.len() / dim;
    for b in 0..batch {
        let row = &mut data[b * dim..(b + 1) * dim];

        let max_val = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for v in row.iter_mut() {
            *v = ((*v - max_val) * beta).exp();
            sum += *v;
        }

        let inv_sum = 1.0 / sum;
        for v in row.iter_mut() {
            *v *= inv_sum;
        }
    }
}

/// Shared `prepare` for single-input, same-shape activations.
pub fn prepare_unary(ctx: &PrepareContext<'_>) -> Result<OpParams, KernelError> {
    ctx.expect_inputs(1, 1)?;
    check_same_numel(ctx.inputs[0], ctx.output())?;
    Ok(OpParams::None)
}

pub fn prepare_softmax(ctx: &PrepareContext<'_>) -> Result<OpParams, KernelError> {
    prepare_unary(ctx)?;
    let beta = match ctx.params.get("beta") {
        None => 1.0,
        Some(value) => value
            .parse::<f32>()
            .ok()
            .filter(|b| b.is_finite() && *b > 0.0)
            .ok_or_else(|| KernelError::BadParam {
                name: "beta".into(),
                value: value.clone(),
            })?,
    };
    let depth = ctx.inputs[0].shape.last().copied().unwrap_or(1).max(1);
    Ok(OpParams::Softmax { beta, depth })
}

fn copy_in(inputs: &[&[f32]], output: &mut [f32]) -> Result<(), KernelError> {
    let input = inputs[0];
    if input.len() != output.len() {
        return Err(KernelError::Length {
            expected: output.len(),
            found: input.len(),
        });
    }
    output.copy_from_slice(input);
    Ok(())
}

pub fn eval_relu(inputs: &[&[f32]], output: &mut [f32], _: &OpParams) -> Result<(), KernelError> {
    copy_in(inputs, output)?;
    relu(output);
    Ok(())
}

pub fn eval_relu6(inputs: &[&[f32]], output: &mut [f32], _: &OpParams) -> Result<(), KernelError> {
    copy_in(inputs, output)?;
    relu6(output);
    Ok(())
}

pub fn eval_logistic(inputs: &[&[f32]], output: &mut [f32], _: &OpParams) -> Result<(), KernelError> {
    copy_in(inputs, output)?;
    logistic(output);
    Ok(())
}

pub fn eval_tanh(inputs: &[&[f32]], output: &mut [f32], _: &OpParams) -> Result<(), KernelError> {
    copy_in(inputs, output)?;
    tanh(output);
    Ok(())
}

pub fn eval_softmax(inputs: &[&[f32]], output: &mut [f32], params: &OpParams) -> Result<(), KernelError> {
    let (beta, depth) = match *params {
        OpParams::Softmax { beta, depth } => (beta, depth),
        _ => (1.0, output.len().max(1)),
    };
    copy_in(inputs, output)?;
    softmax(output, depth, beta);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let mut data = [-1.0, 0.0, 1.0, -0.5, 2.0];
        relu(&mut data);
        assert_eq!(data, [0.0, 0.0, 1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_relu6() {
        let mut data = [-1.0, 3.0, 7.5];
        relu6(&mut data);
        assert_eq!(data, [0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_logistic() {
        let mut data = [0.0, 100.0, -100.0];
        logistic(&mut data);
        assert!((data[0] - 0.5).abs() < 1e-5);
        assert!((data[1] - 1.0).abs() < 1e-5);
        assert!(data[2].abs() < 1e-5);
    }

    #[test]
    fn test_tanh() {
        let mut data = [0.0, 20.0, -20.0];
        tanh(&mut data);
        assert!(data[0].abs() < 1e-6);
        assert!((data[1] - 1.0).abs() < 1e-5);
        assert!((data[2] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_softmax() {
        let mut data = [1.0, 2.0, 3.0];
        softmax(&mut data, 3, 1.0);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(data[2] > data[1]);
        assert!(data[1] > data[0]);
    }

    #[test]
    fn test_softmax_stability() {
        let mut data = [1000.0, 1001.0, 1002.0];
        softmax(&mut data, 3, 1.0);
        assert!(data.iter().all(|v| v.is_finite()));
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_beta_flattens() {
        let mut sharp = [1.0, 2.0];
        let mut flat = [1.0, 2.0];
        softmax(&mut sharp, 2, 1.0);
        softmax(&mut flat, 2, 0.1);
        assert!(flat[1] - flat[0] < sharp[1] - sharp[0]);
    }

    #[test]
    fn test_eval_relu_leaves_input_alone() {
        let input = [-2.0, 2.0];
        let mut out = [9.0f32; 2];
        eval_relu(&[&input], &mut out, &OpParams::None).unwrap();
        assert_eq!(out, [0.0, 2.0]);
        assert_eq!(input, [-2.0, 2.0]);
    }

    #[test]
    fn test_eval_length_mismatch() {
        let input = [1.0, 2.0, 3.0];
        let mut out = [0.0f32; 2];
        assert!(eval_tanh(&[&input], &mut out, &OpParams::None).is_err());
    }
}
