//! skillhostd - skill hosting daemon
//!
//! This daemon:
//! 1. Loads configuration from a JSON file and SKILLHOST_* environment variables
//! 2. Resolves the configured skill from the built-in registry
//! 3. Streams frames from the configured capture source through the session
//! 4. Logs finished evaluations plus a periodic health line
//! 5. Tears the session down on ctrl-c, draining the in-flight evaluation

use anyhow::Result;
use std::time::Duration;

use skillhost::capture::{decode_image_file, source_from_url};
use skillhost::config::SkillhostConfig;
use skillhost::session::{LogSink, SkillSession};
use skillhost::skill::SkillRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SkillhostConfig::load()?;
    let registry = SkillRegistry::with_builtins();
    let skill = registry.resolve(&cfg.skill)?;

    let session = SkillSession::new(skill, Box::new(LogSink));
    let descriptor = session.descriptor();
    log::info!(
        "skillhostd {} hosting skill '{}' v{}",
        env!("CARGO_PKG_VERSION"),
        descriptor.name,
        descriptor.version
    );

    if let Some(path) = &cfg.background_image {
        let background = decode_image_file(path)?;
        session.set_background(background);
        log::info!("background image published from {}", path.display());
    }

    let source = source_from_url(&cfg.source.url, cfg.capture_format())?;
    log::info!("capture source: {} at {}", cfg.source.url, cfg.capture_format());
    session.configure(source, cfg.device).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut health = tokio::time::interval(Duration::from_secs(5));
    health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick completes immediately.
    health.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = health.tick() => {
                let stats = session.stats();
                match session.source_stats().await {
                    Some(source) => log::info!(
                        "health state={} {} source_produced={} source_dropped={}",
                        session.state(),
                        stats,
                        source.produced,
                        source.dropped
                    ),
                    None => log::info!("health state={} {}", session.state(), stats),
                }
            }
        }
    }

    log::info!("ctrl-c received, tearing down");
    session.teardown().await;
    log::info!("final {}", session.stats());
    Ok(())
}
