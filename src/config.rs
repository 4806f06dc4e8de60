// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Pipeline configuration: defaults, TOML files and environment overrides

use crate::kernel::{ArenaKernel, KernelRef};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Default configuration file looked up by [`PipelineConfig::load`]
pub const CONFIG_FILE: &str = "polyframe.toml";

/// How the scene evaluator turns root trees into meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshingMode {
    /// Render jobs on the rayon pool, collected on later ticks
    Background,
    /// Render inline during the tick
    Blocking,
}

impl FromStr for MeshingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "background" => Ok(MeshingMode::Background),
            "blocking" => Ok(MeshingMode::Blocking),
            other => bail!("unknown meshing mode '{}'", other),
        }
    }
}

/// Defaults applied to new shapes and to the kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side of the cubic render region around each root shape
    pub bounds_size: f32,
    /// Half-feature size at which the mesher stops subdividing
    pub resolution: f32,
    /// Normal splitting threshold in degrees; 180 disables splitting
    pub splitting_angle: f32,
    pub meshing: MeshingMode,
    /// Largest grid the kernel will allocate along one axis
    pub max_cells_per_axis: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bounds_size: 2.5,
            resolution: 0.05,
            splitting_angle: 180.0,
            meshing: MeshingMode::Background,
            max_cells_per_axis: 256,
        }
    }
}

fn env_override<T: FromStr>(name: &str, slot: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw))?;
    }
    Ok(())
}

impl PipelineConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `polyframe.toml` from the working directory if present, then
    /// apply environment overrides and validate
    pub fn load() -> Result<Self> {
        let default_path = PathBuf::from(CONFIG_FILE);
        let path = default_path.exists().then_some(default_path);
        Self::load_from(path.as_deref())
    }

    /// Like [`load`](Self::load) with an explicit file (`None` = defaults)
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `POLYFRAME_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        env_override("POLYFRAME_RESOLUTION", &mut self.resolution)?;
        env_override("POLYFRAME_BOUNDS_SIZE", &mut self.bounds_size)?;
        env_override("POLYFRAME_SPLITTING_ANGLE", &mut self.splitting_angle)?;
        env_override("POLYFRAME_MESHING", &mut self.meshing)?;
        env_override("POLYFRAME_MAX_CELLS", &mut self.max_cells_per_axis)?;
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.bounds_size.is_finite() && self.bounds_size > 0.0) {
            bail!("bounds_size must be positive, got {}", self.bounds_size);
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            bail!("resolution must be positive, got {}", self.resolution);
        }
        if !(0.0..=180.0).contains(&self.splitting_angle) {
            bail!(
                "splitting_angle must be within [0, 180] degrees, got {}",
                self.splitting_angle
            );
        }
        if self.max_cells_per_axis == 0 {
            bail!("max_cells_per_axis must be at least 1");
        }
        Ok(())
    }

    /// Arena kernel honouring `max_cells_per_axis`
    pub fn kernel(&self) -> KernelRef {
        Arc::new(ArenaKernel::with_max_cells(self.max_cells_per_axis))
    }
}
