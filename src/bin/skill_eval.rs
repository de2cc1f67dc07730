//! skill_eval - run one skill over a local image file

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use skillhost::capture::decode_image_file;
use skillhost::frame::PendingFrame;
use skillhost::session::{Evaluation, NullSink, SkillSession};
use skillhost::skill::{DeviceKind, SkillRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to evaluate (PNG or JPEG).
    image: PathBuf,
    /// Skill to run.
    #[arg(long, default_value = "background_blur")]
    skill: String,
    /// Device kind to pin the skill to (cpu|gpu|npu).
    #[arg(long)]
    device: Option<DeviceKind>,
    /// Background image, for replacement-style skills.
    #[arg(long)]
    background: Option<PathBuf>,
    /// Write the output image to this path (PNG).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the evaluation as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let registry = SkillRegistry::with_builtins();
    let skill = registry.resolve(&args.skill)?;
    let session = SkillSession::new(skill, Box::new(NullSink));

    stage("prepare skill instance");
    session.prepare(args.device).await?;

    if let Some(path) = &args.background {
        stage("load background image");
        session.set_background(decode_image_file(path)?);
    } else if session.descriptor().uses_auxiliary_image {
        return Err(anyhow!("skill '{}' needs --background <IMAGE>", args.skill));
    }

    stage("evaluate");
    let evaluation = session.evaluate_file(&args.image).await?;

    let output_path = match (&args.output, &evaluation.output) {
        (Some(path), Some(frame)) => {
            stage("write output image");
            save_png(frame, path)?;
            Some(path.clone())
        }
        (Some(_), None) => {
            return Err(anyhow!("skill '{}' produced no output image", args.skill));
        }
        _ => None,
    };

    if args.json {
        print_json(&args, &evaluation, output_path.as_deref())?;
    } else {
        print_summary(&args, &evaluation, output_path.as_deref());
    }
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("skill_eval: {}", msg);
}

/// Frames are BGRA; the PNG encoder wants RGBA.
fn save_png(frame: &PendingFrame, path: &std::path::Path) -> Result<()> {
    let mut rgba = frame.pixels().to_vec();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    let buffer = image::RgbaImage::from_raw(frame.width, frame.height, rgba)
        .ok_or_else(|| anyhow!("output frame geometry does not match its pixel data"))?;
    buffer
        .save(path)
        .with_context(|| format!("writing output image to {}", path.display()))
}

fn print_summary(args: &Args, evaluation: &Evaluation, output_path: Option<&std::path::Path>) {
    println!("evaluation summary:");
    println!("  image: {}", args.image.display());
    println!("  skill: {}", args.skill);
    println!(
        "  timing: bind={}us eval={}us",
        evaluation.timing.bind_us, evaluation.timing.eval_us
    );
    if let Some(faces) = evaluation.face_count() {
        println!("  faces: {}", faces);
    }
    if let Some(intruder) = evaluation.intruder_detected() {
        println!("  intruder: {}", intruder);
    }
    println!("  annotations: {}", evaluation.annotations.len());
    match output_path {
        Some(path) => println!("  output image: {}", path.display()),
        None => println!(
            "  output image: {}",
            if evaluation.output.is_some() {
                "produced (pass --output to save)"
            } else {
                "none"
            }
        ),
    }
}

fn print_json(
    args: &Args,
    evaluation: &Evaluation,
    output_path: Option<&std::path::Path>,
) -> Result<()> {
    let doc = serde_json::json!({
        "image": args.image.display().to_string(),
        "skill": args.skill,
        "sequence": evaluation.sequence,
        "timing": evaluation.timing,
        "results": evaluation.results,
        "annotations": evaluation.annotations,
        "output_image": output_path.map(|p| p.display().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
