//! Vigil Edge benchmark: measures invoke latency for small dense models.
//!
//! Usage: cargo run --example bench_invoke -p vigil-edge --release

use std::time::Instant;

use vigil_edge::{all_ops_resolver, Arena, Interpreter, Model, ModelBuilder, OpKind};

fn main() {
    println!("=== Vigil Edge Benchmark ===");
    println!();

    let configs = [
        ("helmet", 3, 8, 3),
        ("wide", 3, 64, 3),
        ("deep-in", 32, 32, 8),
    ];

    for (name, inputs, hidden, outputs) in &configs {
        let model = build_model(*inputs, *hidden, *outputs);
        let mut interp = Interpreter::new(model, all_ops_resolver(), Arena::new(16 * 1024));
        let report = match interp.allocate_tensors() {
            Ok(r) => r,
            Err(e) => {
                println!("{:<8} allocation failed: {}", name, e);
                continue;
            }
        };
        let (Ok(input), Ok(output)) = (interp.input(0), interp.output(0)) else {
            continue;
        };

        let frame: Vec<f32> = (0..*inputs).map(|i| (i as f32 * 0.37).sin()).collect();

        // Warmup
        for _ in 0..10 {
            let _ = interp.write(input, &frame);
            let _ = interp.invoke();
        }

        let iters = 10_000;
        let start = Instant::now();
        for _ in 0..iters {
            let _ = interp.write(input, &frame);
            let _ = interp.invoke();
        }
        let per_invoke_us = start.elapsed().as_secs_f64() * 1e6 / iters as f64;

        println!(
            "{:<8} {}→{}→{} | arena {}/{} B | {:.2} µs/invoke | out[0]={:.4}",
            name,
            inputs,
            hidden,
            outputs,
            report.required_bytes,
            report.arena_bytes,
            per_invoke_us,
            interp.read(output)[0],
        );
    }

    println!();
    println!("Done.");
}

fn build_model(inputs: usize, hidden: usize, outputs: usize) -> Model {
    let mut b = ModelBuilder::new("bench");
    let x = b.add_tensor("input", &[1, inputs]);
    let w1: Vec<f32> = (0..hidden * inputs).map(|i| ((i as f32 * 0.7123).sin()) * 0.1).collect();
    let w1 = b.add_constant("dense1.weight", &[hidden, inputs], &w1);
    let b1 = b.add_constant("dense1.bias", &[hidden], &vec![0.01; hidden]);
    let h = b.add_tensor("dense1", &[1, hidden]);
    let w2: Vec<f32> = (0..outputs * hidden).map(|i| ((i as f32 * 0.3).cos()) * 0.1).collect();
    let w2 = b.add_constant("dense2.weight", &[outputs, hidden], &w2);
    let y = b.add_tensor("output", &[1, outputs]);

    b.add_op(OpKind::FullyConnected, &[x, w1, b1], &[h]).param("activation", "relu");
    b.add_op(OpKind::FullyConnected, &[h, w2], &[y]);
    b.inputs(&[x]).outputs(&[y]);
    b.build().expect("benchmark model is well formed")
}
