use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vigil_edge::{MemoryPlan, Model, SCHEMA_VERSION};
use vigil_firmware::{
    demo, FirmwareConfig, Firmware, FirmwareOptions, FixedInput, InputSource, LineInput,
    MonotonicClock, ResolverProfile, SerialConsole,
};

const BANNER: &str = r#"
__     ___       _ _
\ \   / (_) __ _(_) |
 \ \ / /| |/ _` | | |
  \ V / | | (_| | | |
   \_/  |_|\__, |_|_|
           |___/"#;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Vigil helmet firmware, host build",
    long_about = "Runs the helmet inference firmware on a host.\n\nstdout plays the serial port; diagnostics go to stderr (RUST_LOG).",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize the model and run the inference loop
    Run {
        /// Config file (toml, json or yaml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Model blob (.vglm); defaults to the built-in helmet model
        #[arg(long)]
        model: Option<PathBuf>,
        /// Scratch arena size in bytes
        #[arg(long)]
        arena_bytes: Option<usize>,
        /// Cycle period in milliseconds, start to start
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after N cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Fixed input frame, e.g. 1.0,1.1,0.9
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        input: Option<Vec<f32>>,
        /// Read one frame per line from stdin instead
        #[arg(long, conflicts_with = "input")]
        stdin: bool,
        /// Register every kernel instead of the minimal set
        #[arg(long)]
        all_ops: bool,
    },
    /// Describe a model blob
    Info {
        /// Model blob (.vglm); defaults to the built-in helmet model
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Write a built-in model blob to disk
    Export {
        /// Output .vglm file path
        #[arg(long, default_value = "model.vglm")]
        output: PathBuf,
        /// Export the scaled-identity model with this scale instead
        #[arg(long)]
        echo: Option<f32>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            model,
            arena_bytes,
            interval_ms,
            cycles,
            input,
            stdin,
            all_ops,
        } => {
            let mut cfg = FirmwareConfig::load(config.as_deref())?;
            if model.is_some() {
                cfg.model_path = model;
            }
            if let Some(n) = arena_bytes {
                cfg.arena_bytes = n;
            }
            if let Some(ms) = interval_ms {
                cfg.interval_ms = ms;
            }
            if cycles.is_some() {
                cfg.max_cycles = cycles;
            }
            if let Some(values) = input {
                cfg.input = values;
            }
            if all_ops {
                cfg.resolver = ResolverProfile::All;
            }
            cfg.validate()?;
            cmd_run(&cfg, stdin)
        }
        Commands::Info { model } => cmd_info(model.as_deref()),
        Commands::Export { output, echo } => cmd_export(&output, echo),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_blob(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("reading model {}", path.display())),
        None => Ok(demo::default_model_bytes()?),
    }
}

fn cmd_run(cfg: &FirmwareConfig, stdin: bool) -> Result<()> {
    tracing::debug!(?cfg, "config loaded");
    let blob = load_blob(cfg.model_path.as_deref())?;

    let input: Box<dyn InputSource> = if stdin {
        Box::new(LineInput::new(std::io::stdin().lock()))
    } else {
        Box::new(FixedInput(cfg.frame()?))
    };

    let mut firmware = Firmware::new(
        FirmwareOptions::from(cfg),
        SerialConsole::stdout(cfg.baud_rate),
        input,
        MonotonicClock::new(),
    );

    if firmware.setup(&blob).is_err() {
        match firmware.fault() {
            Some(fault) => bail!("setup failed: {}", fault),
            None => bail!("setup failed"),
        }
    }

    firmware.run(cfg.max_cycles)?;
    Ok(())
}

fn cmd_info(path: Option<&Path>) -> Result<()> {
    println!("{}", BANNER);
    println!("  v{}  -  helmet inference firmware\n", env!("CARGO_PKG_VERSION"));

    let blob = load_blob(path)?;
    let version = Model::peek_version(&blob)?;
    println!("Blob");
    println!("  Size:    {} bytes", blob.len());
    println!(
        "  Schema:  v{} (runtime v{}) {}",
        version,
        SCHEMA_VERSION,
        if version == SCHEMA_VERSION { "[x]" } else { "[ ]" }
    );
    if version != SCHEMA_VERSION {
        bail!("model schema version is not compatible");
    }

    let model = Model::from_bytes(&blob)?;
    let header = &model.header;
    println!("  Name:    {}", header.name);
    if !header.description.is_empty() {
        println!("  About:   {}", header.description);
    }
    println!("  Weights: {} bytes", model.weights_len());

    println!("\nTensors ({})", header.tensors.len());
    for (i, t) in header.tensors.iter().enumerate() {
        let role = if header.inputs.contains(&i) {
            "input"
        } else if header.outputs.contains(&i) {
            "output"
        } else if t.is_constant() {
            "const"
        } else {
            ""
        };
        println!("  {:>3} {:<16} {:<4} {:<12} {}", i, t.name, t.dtype.as_str(), format!("{:?}", t.shape), role);
    }

    println!("\nOps ({})", header.ops.len());
    for (i, node) in header.ops.iter().enumerate() {
        println!("  {:>3} {:<16} {:?} -> {:?}", i, node.op.as_str(), node.inputs, node.outputs);
    }

    let plan = MemoryPlan::from_header(header);
    println!("\nArena");
    println!("  Required: {} bytes", plan.required_bytes());
    println!("  Naive:    {} bytes", plan.naive_bytes());
    Ok(())
}

fn cmd_export(output: &Path, echo: Option<f32>) -> Result<()> {
    let (name, blob) = match echo {
        Some(scale) => (format!("echo x{}", scale), demo::echo_model_bytes(scale)?),
        None => ("helmet".to_string(), demo::default_model_bytes()?),
    };
    std::fs::write(output, &blob).with_context(|| format!("writing {}", output.display()))?;
    println!("Exported {} model: {} bytes -> {}", name, blob.len(), output.display());
    Ok(())
}
