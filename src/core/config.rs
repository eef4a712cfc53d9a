//! Voxelizer and builder configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "compute": { "threads": 4 }, "voxelize": { "voxels_on_y": 64 } }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::core::{Error, Result};
use crate::voxel::scene::MaterialSlot;

/// Default number of invocations per workgroup.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 32;

/// Largest accepted `voxels_on_y`.
pub const MAX_VOXELS_ON_Y: u32 = 256;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SvoxConfig {
    pub compute: ComputeConfig,
    pub voxelize: VoxelizeConfig,
}

/// Parallel unit configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Invocations batched into one workgroup.
    pub workgroup_size: u32,
    /// Worker threads for the compute pool (None = one per logical core).
    pub threads: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            threads: None,
        }
    }
}

/// Voxelization configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VoxelizeConfig {
    /// Voxels along the Y axis; other axes follow the scene's aspect ratio.
    pub voxels_on_y: u32,
    /// Treat a non-zero raster error count as a failed voxelization.
    pub fail_on_raster_errors: bool,
    /// Material channel sampled for voxel colors.
    pub material_slot: MaterialSlot,
}

impl Default for VoxelizeConfig {
    fn default() -> Self {
        Self {
            voxels_on_y: 128,
            fail_on_raster_errors: false,
            material_slot: MaterialSlot::Diffuse,
        }
    }
}

impl SvoxConfig {
    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SvoxConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.compute.workgroup_size == 0 {
            return Err(Error::KernelSetup("workgroup_size must be at least 1".to_string()));
        }
        if self.compute.threads == Some(0) {
            return Err(Error::KernelSetup("threads must be at least 1".to_string()));
        }
        if !(1..=MAX_VOXELS_ON_Y).contains(&self.voxelize.voxels_on_y) {
            return Err(Error::VoxelsOnYOutOfRange(self.voxelize.voxels_on_y));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SvoxConfig::default();
        assert_eq!(config.compute.workgroup_size, 32);
        assert_eq!(config.compute.threads, None);
        assert_eq!(config.voxelize.voxels_on_y, 128);
        assert!(!config.voxelize.fail_on_raster_errors);
        assert_eq!(config.voxelize.material_slot, MaterialSlot::Diffuse);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = SvoxConfig::from_json(
            r#"{ "compute": { "threads": 2 }, "voxelize": { "voxels_on_y": 64, "material_slot": "emissive" } }"#,
        )
        .unwrap();
        assert_eq!(config.compute.threads, Some(2));
        assert_eq!(config.compute.workgroup_size, 32);
        assert_eq!(config.voxelize.voxels_on_y, 64);
        assert_eq!(config.voxelize.material_slot, MaterialSlot::Emissive);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            SvoxConfig::from_json(r#"{ "voxelize": { "voxels_on_y": 0 } }"#),
            Err(Error::VoxelsOnYOutOfRange(0))
        ));
        assert!(matches!(
            SvoxConfig::from_json(r#"{ "voxelize": { "voxels_on_y": 257 } }"#),
            Err(Error::VoxelsOnYOutOfRange(257))
        ));
        assert!(matches!(
            SvoxConfig::from_json(r#"{ "compute": { "workgroup_size": 0 } }"#),
            Err(Error::KernelSetup(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(SvoxConfig::from_json("{ nope"), Err(Error::Config(_))));
    }
}
