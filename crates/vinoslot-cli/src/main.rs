mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, RunArgs};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vinoslot_backend_openvino::OpenVinoPlugin;
use vinoslot_core::{ir, ModelArtifact, Plugin, Shape, Tensor};
use vinoslot_runtime::{InferenceSession, SessionConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).context("invalid --log filter")?)
        .init();

    match cli.command {
        Command::Inspect { model } => inspect(model),
        Command::Run(args) => {
            let config = session_config(args)?;
            run(&config)
        }
    }
}

fn inspect(model: std::path::PathBuf) -> Result<()> {
    let artifact = ModelArtifact::from_topology(model);
    let network = ir::read_network(&artifact)
        .with_context(|| format!("failed to read {}", artifact.topology.display()))?;

    println!("network  {}", network.name);
    println!("weights  {}", artifact.weights.display());
    for spec in &network.inputs {
        println!("input    {} {} {:?}", spec.name, spec.dtype, spec.dims);
    }
    for spec in &network.outputs {
        println!("output   {} {} {:?}", spec.name, spec.dtype, spec.dims);
    }
    for layer in &network.layers {
        let version = layer.version.as_deref().unwrap_or("-");
        println!("layer    {:<24} {:<20} {version}", layer.name, layer.kind);
    }
    Ok(())
}

/// File values first, flags on top.
fn session_config(args: RunArgs) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SessionConfig {
            model: args
                .model
                .clone()
                .context("either --model or --config is required")?,
            device: "CPU".to_string(),
            requests: 1,
            extension: None,
            wait_timeout_ms: None,
        },
    };

    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(requests) = args.requests {
        config.requests = requests;
    }
    if let Some(extension) = args.extension {
        config.extension = Some(extension);
    }
    if let Some(ms) = args.wait_timeout_ms {
        config.wait_timeout_ms = Some(ms);
    }
    Ok(config)
}

fn run(config: &SessionConfig) -> Result<()> {
    let options = config.load_options()?;
    let mut session = InferenceSession::<OpenVinoPlugin>::new();
    let (plugin, shape) = session
        .load(&options, None)
        .with_context(|| format!("failed to load {}", options.model.display()))?;
    info!(backend = plugin.name(), device = %plugin.device(), %shape, "model ready");

    let spec = session.input_spec()?.clone();
    // Dynamic dimensions get a single element.
    let dims: Vec<usize> = spec.dims.iter().map(|d| d.unwrap_or(1)).collect();
    let slots = session.request_count()?;

    for slot in 0..slots {
        session.execute(slot, Tensor::zeros(spec.dtype, Shape::from_slice(&dims)))?;
    }

    for slot in 0..slots {
        let status = match config.wait_timeout() {
            Some(timeout) => session.wait_timeout(slot, timeout)?,
            None => session.wait(slot)?,
        };
        if !status.is_ok() {
            warn!(slot, %status, "request did not complete");
            continue;
        }
        let out = session.output(slot, None)?;
        println!(
            "slot {slot}: {} {} {} ({} bytes)",
            session.output_name()?,
            out.desc.dtype,
            out.desc.shape,
            out.byte_len()
        );
    }
    Ok(())
}
