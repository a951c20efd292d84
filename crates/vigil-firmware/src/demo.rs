//! Built-in models: the helmet network and a scaled identity for testing.

use vigil_edge::{FormatError, Model, ModelBuilder, OpKind};

use crate::input::FRAME_LEN;

const HIDDEN: usize = 8;

/// The helmet network: FC(3→8) → ReLU → FC(8→3), fixed deterministic weights.
pub fn default_model() -> Result<Model, FormatError> {
    let mut b = ModelBuilder::new("helmet");
    b.description("sensor frame classifier: 3 IMU features to 3 scores");

    let w1: Vec<f32> = (0..HIDDEN * FRAME_LEN)
        .map(|i| ((i * 7 + 3) % 11) as f32 * 0.1 - 0.5)
        .collect();
    let b1: Vec<f32> = (0..HIDDEN).map(|i| (i % 3) as f32 * 0.05).collect();
    let w2: Vec<f32> = (0..FRAME_LEN * HIDDEN)
        .map(|i| ((i * 5 + 1) % 13) as f32 * 0.08 - 0.4)
        .collect();
    let b2 = [0.1, 0.0, -0.1];

    let x = b.add_tensor("sensor", &[1, FRAME_LEN]);
    let w1 = b.add_constant("dense1.weight", &[HIDDEN, FRAME_LEN], &w1);
    let b1 = b.add_constant("dense1.bias", &[HIDDEN], &b1);
    let h = b.add_tensor("dense1", &[1, HIDDEN]);
    let r = b.add_tensor("relu", &[1, HIDDEN]);
    let w2 = b.add_constant("dense2.weight", &[FRAME_LEN, HIDDEN], &w2);
    let b2 = b.add_constant("dense2.bias", &[FRAME_LEN], &b2);
    let y = b.add_tensor("scores", &[1, FRAME_LEN]);

    b.add_op(OpKind::FullyConnected, &[x, w1, b1], &[h]);
    b.add_op(OpKind::Relu, &[h], &[r]);
    b.add_op(OpKind::FullyConnected, &[r, w2, b2], &[y]);
    b.inputs(&[x]).outputs(&[y]);
    b.build()
}

pub fn default_model_bytes() -> Result<Vec<u8>, FormatError> {
    default_model()?.to_bytes()
}

/// FC(3→3) with `scale * I` weights and zero bias: output = scale * input.
pub fn echo_model(scale: f32) -> Result<Model, FormatError> {
    let mut b = ModelBuilder::new("echo");
    b.description("scaled identity");

    let mut weights = [0.0f32; FRAME_LEN * FRAME_LEN];
    for i in 0..FRAME_LEN {
        weights[i * FRAME_LEN + i] = scale;
    }

    let x = b.add_tensor("input", &[1, FRAME_LEN]);
    let w = b.add_constant("echo.weight", &[FRAME_LEN, FRAME_LEN], &weights);
    let bias = b.add_constant("echo.bias", &[FRAME_LEN], &[0.0; FRAME_LEN]);
    let y = b.add_tensor("output", &[1, FRAME_LEN]);
    b.add_op(OpKind::FullyConnected, &[x, w, bias], &[y]);
    b.inputs(&[x]).outputs(&[y]);
    b.build()
}

pub fn echo_model_bytes(scale: f32) -> Result<Vec<u8>, FormatError> {
    echo_model(scale)?.to_bytes()
}
