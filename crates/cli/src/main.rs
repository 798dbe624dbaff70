#![deny(unsafe_code)]
//! CLI binary for flowlines.
//!
//! Subcommands:
//! - `trace`: run a session for N ticks and emit the traced polylines
//! - `pack`: pack circles and emit them with the movement path
//! - `field`: populate a vector field and emit its grid
//! - `list`: print generator kinds and the session parameter schema
//!
//! Results are JSON, written to stdout or to `--output`. Logs go to stderr
//! and follow `RUST_LOG`; `--verbose` raises the default level to debug.

mod error;

use clap::{Args, Parser, Subcommand};
use error::CliError;
use flowlines_core::field_source::{compose_specs, FractalNoiseSpec};
use flowlines_core::{
    random_seed_from, CirclePacker, DynamicField, FieldConfig, FlowSketch, GeneratorSpec,
    PackerConfig, Seed,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowlines", about = "Procedural flow-line generator")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Log debug detail to stderr (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Canvas {
    /// Canvas width in world units.
    #[arg(short = 'W', long, default_value_t = 800)]
    width: usize,

    /// Canvas height in world units.
    #[arg(short = 'H', long, default_value_t = 600)]
    height: usize,

    /// PRNG seed. Takes precedence over --phrase.
    #[arg(long)]
    seed: Option<u64>,

    /// Phrase hashed into a seed when --seed is absent.
    #[arg(long)]
    phrase: Option<String>,

    /// Parameters as a JSON object.
    #[arg(long, default_value = "{}")]
    params: String,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a session and emit the traced polylines.
    Trace {
        #[command(flatten)]
        canvas: Canvas,

        /// Number of ticks, with progress spread over [0, 1].
        #[arg(short, long, default_value_t = 60)]
        ticks: usize,
    },
    /// Pack circles and emit them with the movement path and windows.
    Pack {
        #[command(flatten)]
        canvas: Canvas,
    },
    /// Populate a vector field and emit its grid.
    Field {
        #[command(flatten)]
        canvas: Canvas,

        /// Time passed to the generators.
        #[arg(long, default_value_t = 0.0)]
        time: f64,
    },
    /// List generator kinds and session parameters.
    List,
}

impl Canvas {
    /// Resolves the seed and parses `--params` into a [`Seed`].
    fn to_seed(&self) -> Result<Seed, CliError> {
        let params: Value = serde_json::from_str(&self.params)
            .map_err(|e| CliError::Input(format!("invalid --params JSON: {e}")))?;
        if !params.is_object() {
            return Err(CliError::Input("--params must be a JSON object".into()));
        }
        let seed = match (self.seed, self.phrase.as_deref()) {
            (Some(seed), _) => Seed::new(self.width, self.height, seed),
            (None, Some(phrase)) if !phrase.is_empty() => {
                Seed::from_phrase(self.width, self.height, phrase)
            }
            (None, _) => Seed::new(self.width, self.height, random_seed_from(None)),
        };
        let s = seed.with_params(params);
        s.validate()?;
        Ok(s)
    }
}

fn trace_result(canvas: &Canvas, ticks: usize) -> Result<Value, CliError> {
    let mut seed = canvas.to_seed()?;
    seed.ticks = ticks;
    let mut sketch = FlowSketch::new(&seed)?;
    let lines = sketch.run(ticks);
    Ok(json!({
        "seed": sketch.to_seed(),
        "params": sketch.params(),
        "lines": lines,
    }))
}

fn pack_result(canvas: &Canvas) -> Result<Value, CliError> {
    let seed = canvas.to_seed()?;
    let config = PackerConfig::from_json(&seed.params);
    let mut packer = CirclePacker::new(seed.seed, seed.width, seed.height, config)?;
    packer.setup().grow_circles_indefinitely();
    Ok(json!({
        "seed": seed,
        "config": config.to_json(),
        "movement": packer.movement(),
        "windows": packer.window_endpoints(),
        "circles": packer.circles(),
    }))
}

fn field_result(canvas: &Canvas, time: f64) -> Result<Value, CliError> {
    let seed = canvas.to_seed()?;
    let config = FieldConfig::from_json(&seed.params);
    let specs = match seed.params.get("generators") {
        Some(list) => GeneratorSpec::parse_list(list)?,
        None => vec![GeneratorSpec::FractalNoise(FractalNoiseSpec::default())],
    };
    let mut field = DynamicField::new(seed.width, seed.height, seed.seed, &config)?;
    let mut generator = compose_specs(&specs, field.geometry(), seed.seed);
    field.populate(&mut generator, time);
    let g = field.geometry();
    Ok(json!({
        "seed": seed,
        "time": time,
        "resolution": g.resolution(),
        "cols": g.cols(),
        "rows": g.rows(),
        "min": g.min(),
        "max": g.max(),
        "generators": specs,
        "vectors": field.vectors(),
    }))
}

fn list_result() -> Value {
    json!({
        "generators": GeneratorSpec::list_kinds(),
        "params": FlowSketch::param_schema(),
    })
}

fn write_output(path: &Path, text: &str) -> Result<(), CliError> {
    std::fs::write(path, text).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Prints `value`, or writes it to `output` and reports where it went.
fn emit(
    value: &Value,
    output: Option<&Path>,
    json_mode: bool,
    summary: &str,
) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)?;
    let Some(path) = output else {
        println!("{text}");
        return Ok(());
    };
    write_output(path, &text)?;
    if json_mode {
        let info = json!({"summary": summary, "output": path.display().to_string()});
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        eprintln!("{summary} -> {}", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::List => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list_result())?);
            } else {
                println!("Generators:");
                for kind in GeneratorSpec::list_kinds() {
                    println!("  {kind}");
                }
                println!("Params:");
                if let Value::Object(schema) = FlowSketch::param_schema() {
                    for (name, entry) in schema {
                        let description = entry["description"].as_str().unwrap_or("");
                        println!("  {name:<18} {description}");
                    }
                }
            }
        }
        Command::Trace { canvas, ticks } => {
            let value = trace_result(&canvas, ticks)?;
            let count = value["lines"].as_array().map_or(0, Vec::len);
            let summary = format!(
                "traced {count} lines ({}x{}, {ticks} ticks, seed {})",
                canvas.width, canvas.height, value["seed"]["seed"]
            );
            emit(&value, canvas.output.as_deref(), cli.json, &summary)?;
        }
        Command::Pack { canvas } => {
            let value = pack_result(&canvas)?;
            let count = value["circles"].as_array().map_or(0, Vec::len);
            let summary = format!("packed {count} circles (seed {})", value["seed"]["seed"]);
            emit(&value, canvas.output.as_deref(), cli.json, &summary)?;
        }
        Command::Field { canvas, time } => {
            let value = field_result(&canvas, time)?;
            let summary = format!(
                "populated {}x{} cells at t={time} (seed {})",
                value["cols"], value["rows"], value["seed"]["seed"]
            );
            emit(&value, canvas.output.as_deref(), cli.json, &summary)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        tracing::debug!(error = %e, code = e.exit_code(), "command failed");
        if json_mode {
            let j = json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
