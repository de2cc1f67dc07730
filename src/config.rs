use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::CaptureFormat;
use crate::skill::DeviceKind;

const DEFAULT_SKILL: &str = "background_blur";
const DEFAULT_SOURCE_URL: &str = "synthetic://demo";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct SkillhostConfigFile {
    skill: Option<String>,
    device: Option<String>,
    source: Option<SourceConfigFile>,
    background_image: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SkillhostConfig {
    pub skill: String,
    /// Device kind to pin the skill to; None lets the skill pick.
    pub device: Option<DeviceKind>,
    pub source: SourceSettings,
    /// Background image for replacement-style skills, published at startup.
    pub background_image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl SkillhostConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SKILLHOST_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SkillhostConfigFile) -> Result<Self> {
        let skill = file.skill.unwrap_or_else(|| DEFAULT_SKILL.to_string());
        let device = file
            .device
            .as_deref()
            .map(parse_device_kind)
            .transpose()?;
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        Ok(Self {
            skill,
            device,
            source,
            background_image: file.background_image,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(skill) = std::env::var("SKILLHOST_SKILL") {
            if !skill.trim().is_empty() {
                self.skill = skill.trim().to_string();
            }
        }
        if let Ok(device) = std::env::var("SKILLHOST_DEVICE") {
            if !device.trim().is_empty() {
                self.device = Some(parse_device_kind(&device)?);
            }
        }
        if let Ok(url) = std::env::var("SKILLHOST_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(fps) = std::env::var("SKILLHOST_FPS") {
            let target_fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("SKILLHOST_FPS must be an integer frame rate"))?;
            self.source.target_fps = target_fps;
        }
        if let Ok(path) = std::env::var("SKILLHOST_BACKGROUND") {
            if !path.trim().is_empty() {
                self.background_image = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.skill.is_empty() {
            return Err(anyhow!("skill name must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source frame rate must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        Ok(())
    }

    /// The capture format the configured source should be asked for.
    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.source.width,
            height: self.source.height,
            frame_rate: self.source.target_fps,
        }
    }
}

fn parse_device_kind(value: &str) -> Result<DeviceKind> {
    value
        .parse::<DeviceKind>()
        .map_err(|e| anyhow!("invalid device in configuration: {}", e))
}

fn read_config_file(path: &Path) -> Result<SkillhostConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
