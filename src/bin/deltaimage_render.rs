use anyhow::{Context, Result, anyhow};
use clap::Parser;
use deltaimage::cli::WorkersAiOptions;
use deltaimage::config::setup_logging;
use deltaimage::constants::{
    DEFAULT_GUIDANCE_SCALE, DEFAULT_NUM_STEPS, DEFAULT_STRENGTH, MAX_NUM_STEPS, MAX_STRENGTH,
    MIN_NUM_STEPS, MIN_STRENGTH,
};
use deltaimage::generation::{Generator, ModelIds};
use deltaimage::request::{DeltaRequest, GenerationRequest};
use deltaimage::store::MemoryStore;
use deltaimage::workers_ai::WorkersAiClient;
use std::path::PathBuf;
use std::sync::Arc;

/// Render a base image and a chain of deltas without running the server.
///
/// Minimal UX:
///   deltaimage_render "a red fox" --delta "in snow" --delta "at night"
#[derive(Parser, Debug)]
#[command(name = "deltaimage_render")]
#[command(about = "Generate an image from a prompt, then evolve it with img2img deltas")]
struct Args {
    /// Prompt for the base image
    prompt: String,

    /// Delta prompt, applied in order, repeatable
    #[arg(long = "delta")]
    deltas: Vec<String>,

    /// Negative prompt for the base image
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Diffusion steps for the base image, clamped to 1..=20
    #[arg(long, default_value_t = DEFAULT_NUM_STEPS)]
    num_steps: u8,

    /// Strength for the base image, clamped to 0.1..=1.0
    #[arg(long, default_value_t = DEFAULT_STRENGTH)]
    strength: f32,

    /// Guidance scale for the base image
    #[arg(long, default_value_t = DEFAULT_GUIDANCE_SCALE)]
    guidance_scale: f32,

    /// Seed, reused for every step when set
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the final PNG
    #[arg(long, short, default_value = "./generated.png")]
    out: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(flatten)]
    workers_ai: WorkersAiOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug).map_err(|err| anyhow!("Failed to set up logging: {err}"))?;

    if args.out.exists() {
        return Err(anyhow!("Output already exists: {}", args.out.display()));
    }

    let base = GenerationRequest {
        negative_prompt: args.negative_prompt.clone(),
        num_steps: args.num_steps.clamp(MIN_NUM_STEPS, MAX_NUM_STEPS),
        strength: args.strength.clamp(MIN_STRENGTH, MAX_STRENGTH),
        guidance_scale: args.guidance_scale,
        seed: args.seed,
        ..GenerationRequest::new(args.prompt.trim())
    };
    base.validate().context("Invalid base prompt")?;

    let mut deltas = Vec::with_capacity(args.deltas.len());
    for (index, delta) in args.deltas.iter().enumerate() {
        let delta = DeltaRequest {
            seed: args.seed,
            ..DeltaRequest::new(delta.trim())
        };
        delta
            .validate()
            .with_context(|| format!("Invalid --delta number {}", index + 1))?;
        deltas.push(delta);
    }

    let client = WorkersAiClient::new(&args.workers_ai)?;
    let models = ModelIds {
        text_to_image: args.workers_ai.text_model.clone(),
        image_to_image: args.workers_ai.img2img_model.clone(),
    };
    let generator = Generator::new(Arc::new(client), Arc::new(MemoryStore::new()), models);

    let image = generator
        .render_sequence(&base, &deltas)
        .await
        .context("Rendering failed")?;

    if let Some(parent) = args.out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&args.out, &image)
        .with_context(|| format!("Failed to write {}", args.out.display()))?;

    if let Some(record) = generator.store().get().await? {
        eprintln!("Final prompt: {}", record.prompt);
    }
    eprintln!("Saved: {}", args.out.display());
    Ok(())
}
