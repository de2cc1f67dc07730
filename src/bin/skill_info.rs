//! skill_info - list built-in skills and the devices they run on

use anyhow::Result;
use clap::Parser;

use skillhost::skill::{SkillRegistry, SKILL_API_REVISION};

#[derive(Parser, Debug)]
#[command(
    name = "skill_info",
    about = "List built-in skills and the devices they run on"
)]
struct Args {
    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let registry = SkillRegistry::with_builtins();

    if args.json {
        let skills: Vec<serde_json::Value> = registry
            .list()
            .into_iter()
            .map(|descriptor| {
                let devices: Vec<String> = registry
                    .get(descriptor.name)
                    .map(|skill| {
                        skill
                            .supported_devices()
                            .iter()
                            .map(|d| d.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                serde_json::json!({
                    "name": descriptor.name,
                    "description": descriptor.description,
                    "version": descriptor.version,
                    "minimum_api_revision": descriptor.minimum_api_revision,
                    "uses_auxiliary_image": descriptor.uses_auxiliary_image,
                    "devices": devices,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "api_revision": SKILL_API_REVISION,
            "skills": skills,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("host api revision: {}", SKILL_API_REVISION);
    println!();
    for descriptor in registry.list() {
        println!("{} v{}", descriptor.name, descriptor.version);
        println!("  {}", descriptor.description);
        println!("  minimum api revision: {}", descriptor.minimum_api_revision);
        if descriptor.uses_auxiliary_image {
            println!("  uses an auxiliary background image");
        }
        if let Some(skill) = registry.get(descriptor.name) {
            let devices: Vec<String> = skill
                .supported_devices()
                .iter()
                .map(|d| d.to_string())
                .collect();
            println!("  devices: {}", devices.join(", "));
        }
        println!();
    }
    Ok(())
}
