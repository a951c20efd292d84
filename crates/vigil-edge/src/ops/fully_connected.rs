//! Fully-connected layer: `out[b, j] = sum_k in[b, k] * W[j, k] + bias[j]`.
//!
//! Weights are `[units, in_features]` row-major, the layout the converter
//! emits. Leading input dimensions are treated as a batch.

use super::{KernelError, OpParams, PrepareContext};

/// Dense f32 forward pass over `batch` rows.
pub fn fully_connected(
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
    units: usize,
    in_features: usize,
) {
    if units == 0 || in_features == 0 {
        return;
    }
    let batch = output.len() / units;
    for b in 0..batch {
        let x = &input[b * in_features..(b + 1) * in_features];
        let y = &mut output[b * units..(b + 1) * units];
        for j in 0..units {
            let w = &weights[j * in_features..(j + 1) * in_features];
            let mut acc = bias.map_or(0.0, |bias| bias[j]);
            for k in 0..in_features {
                acc += x[k] * w[k];
            }
            y[j] = acc;
        }
    }
}

pub fn prepare(ctx: &PrepareContext<'_>) -> Result<OpParams, KernelError> {
    ctx.expect_inputs(2, 3)?;
    let input = ctx.inputs[0];
    let weights = ctx.inputs[1];
    let output = ctx.output();

    let (units, in_features) = match weights.shape.as_slice() {
        &[units, in_features] => (units, in_features),
        _ => {
            return Err(KernelError::Shape {
                tensor: weights.name.clone(),
                expected: vec![output.shape.last().copied().unwrap_or(0), input.numel()],
                found: weights.shape.clone(),
            })
        }
    };

    if units == 0 {
        return Err(KernelError::Shape {
            tensor: weights.name.clone(),
            expected: vec![output.shape.last().copied().unwrap_or(1).max(1), in_features],
            found: weights.shape.clone(),
        });
    }

    if in_features == 0 || input.numel() % in_features != 0 {
        return Err(KernelError::Shape {
            tensor: input.name.clone(),
            expected: vec![in_features],
            found: input.shape.clone(),
        });
    }
    let batch = input.numel() / in_features;

    if output.numel() != batch * units {
        return Err(KernelError::Shape {
            tensor: output.name.clone(),
            expected: vec![batch, units],
            found: output.shape.clone(),
        });
    }

    if let Some(bias) = ctx.inputs.get(2) {
        if bias.numel() != units {
            return Err(KernelError::Shape {
                tensor: bias.name.clone(),
                expected: vec![units],
                found: bias.shape.clone(),
            });
        }
    }

    Ok(OpParams::FullyConnected {
        units,
        in_features,
        activation: ctx.activation()?,
    })
}

pub fn eval(inputs: &[&[f32]], output: &mut [f32], params: &OpParams) -> Result<(), KernelError> {
    let &OpParams::FullyConnected {
        units,
        in_features,
        activation,
    } = params
    else {
        return Err(KernelError::BadParam {
            name: "params".into(),
            value: format!("{:?}", params),
        });
    };

    let weights = inputs[1];
    if weights.len() != units * in_features {
        return Err(KernelError::Length {
            expected: units * in_features,
            found: weights.len(),
        });
    }

    fully_connected(inputs[0], weights, inputs.get(2).copied(), output, units, in_features);
    activation.apply(output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::format::{DType, TensorEntry};
    use crate::ops::Activation;

    #[test]
    fn test_identity_weights() {
        let x = [1.0, 2.0, 3.0];
        let w = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let mut y = [0.0f32; 3];
        fully_connected(&x, &w, None, &mut y, 3, 3);
        assert_eq!(y, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_bias() {
        let x = [1.0, 1.0];
        let w = [1.0, 2.0, 3.0, 4.0]; // [2 units, 2 features]
        let bias = [10.0, 20.0];
        let mut y = [0.0f32; 2];
        fully_connected(&x, &w, Some(&bias), &mut y, 2, 2);
        assert_eq!(y, [13.0, 27.0]);
    }

    #[test]
    fn test_batched() {
        let x = [1.0, 0.0, 0.0, 1.0]; // [2, 2]
        let w = [2.0, 3.0]; // [1 unit, 2 features]
        let mut y = [0.0f32; 2];
        fully_connected(&x, &w, None, &mut y, 1, 2);
        assert_eq!(y, [2.0, 3.0]);
    }

    fn params(units: usize, in_features: usize, activation: Activation) -> OpParams {
        OpParams::FullyConnected {
            units,
            in_features,
            activation,
        }
    }

    #[test]
    fn test_eval_without_bias() {
        let x = [1.0, 2.0, 3.0];
        let w = [1.0, 1.0, 1.0, 0.0, 0.0, 1.0]; // [2 units, 3 features]
        let mut y = [0.0f32; 2];
        eval(&[&x, &w], &mut y, &params(2, 3, Activation::None)).unwrap();
        assert_eq!(y, [6.0, 3.0]);
    }

    #[test]
    fn test_eval_rejects_short_weights() {
        let x = [1.0, 2.0, 3.0];
        let w = [1.0, 1.0];
        let mut y = [0.0f32; 2];
        let err = eval(&[&x, &w], &mut y, &params(2, 3, Activation::None)).unwrap_err();
        assert!(matches!(err, KernelError::Length { expected: 6, found: 2 }));
    }

    #[test]
    fn test_eval_fused_relu() {
        let x = [1.0, -1.0];
        let w = [1.0, 0.0, 0.0, 1.0];
        let bias = [0.0, 0.0];
        let mut y = [0.0f32; 2];
        eval(&[&x, &w, &bias], &mut y, &params(2, 2, Activation::Relu)).unwrap();
        assert_eq!(y, [1.0, 0.0]);
    }

    fn entry(name: &str, shape: &[usize]) -> TensorEntry {
        TensorEntry {
            name: name.to_string(),
            dtype: DType::F32,
            shape: shape.to_vec(),
            buffer: None,
        }
    }

    #[test]
    fn test_prepare_rejects_zero_units() {
        let x = entry("x", &[1, 3]);
        let w = entry("w", &[0, 3]);
        let h = entry("h", &[1, 0]);
        let params = BTreeMap::new();
        let ctx = PrepareContext {
            params: &params,
            inputs: vec![&x, &w],
            outputs: vec![&h],
        };
        match prepare(&ctx) {
            Err(KernelError::Shape { tensor, found, .. }) => {
                assert_eq!(tensor, "w");
                assert_eq!(found, vec![0, 3]);
            }
            other => panic!("expected Shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_accepts_dense_shapes() {
        let x = entry("x", &[2, 3]);
        let w = entry("w", &[4, 3]);
        let y = entry("y", &[2, 4]);
        let raw_params = BTreeMap::new();
        let ctx = PrepareContext {
            params: &raw_params,
            inputs: vec![&x, &w],
            outputs: vec![&y],
        };
        assert_eq!(prepare(&ctx).unwrap(), params(4, 3, Activation::None));
    }
}
