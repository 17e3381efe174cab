//! Quality tiers and the controller that owns the live pipeline settings.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::primitives::BilateralParams;
use crate::PipelineConfig;

/// Coarse latency/fidelity trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Fast = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Fast, QualityTier::Normal, QualityTier::High];

    pub const fn as_str(self) -> &'static str {
        match self {
            QualityTier::Fast => "fast",
            QualityTier::Normal => "normal",
            QualityTier::High => "high",
        }
    }

    /// Stage configuration for this tier. Pure; the values are fixed.
    pub const fn stages(self) -> StageSet {
        match self {
            QualityTier::Fast => StageSet {
                tier: self,
                sharpen: false,
                sharpen_sigma: SHARPEN_SIGMA,
                bilateral: LIGHT_BILATERAL,
            },
            QualityTier::Normal => StageSet {
                tier: self,
                sharpen: true,
                sharpen_sigma: SHARPEN_SIGMA,
                bilateral: LIGHT_BILATERAL,
            },
            QualityTier::High => StageSet {
                tier: self,
                sharpen: true,
                sharpen_sigma: SHARPEN_SIGMA,
                bilateral: STRONG_BILATERAL,
            },
        }
    }
}

impl TryFrom<i64> for QualityTier {
    type Error = Error;

    fn try_from(level: i64) -> Result<Self> {
        match level {
            0 => Ok(QualityTier::Fast),
            1 => Ok(QualityTier::Normal),
            2 => Ok(QualityTier::High),
            other => Err(Error::InvalidTier(other)),
        }
    }
}

impl TryFrom<i32> for QualityTier {
    type Error = Error;

    fn try_from(level: i32) -> Result<Self> {
        QualityTier::try_from(level as i64)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SHARPEN_SIGMA: f32 = 1.5;

const LIGHT_BILATERAL: BilateralParams = BilateralParams {
    diameter: 5,
    sigma_color: 50.0,
    sigma_space: 50.0,
};

const STRONG_BILATERAL: BilateralParams = BilateralParams {
    diameter: 9,
    sigma_color: 75.0,
    sigma_space: 75.0,
};

/// Which optional stages run, and with what strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSet {
    pub tier: QualityTier,
    /// Unsharp mask between contrast normalization and denoising
    pub sharpen: bool,
    pub sharpen_sigma: f32,
    pub bilateral: BilateralParams,
}

/// Holds the live [`PipelineConfig`].
///
/// Writers swap in a whole new config; readers take an `Arc` snapshot, so a
/// frame in flight never observes a half-applied change.
pub struct QualityController {
    config: ArcSwap<PipelineConfig>,
}

impl QualityController {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
        })
    }

    pub fn tier(&self) -> QualityTier {
        self.config.load().quality_tier
    }

    /// Set the tier from an ordinal. Out-of-range levels leave the current
    /// tier in place.
    pub fn set_level(&self, level: i64) -> Result<QualityTier> {
        match QualityTier::try_from(level) {
            Ok(tier) => {
                self.set_tier(tier);
                Ok(tier)
            }
            Err(err) => {
                warn!(level, current = %self.tier(), "rejected quality level");
                Err(err)
            }
        }
    }

    pub fn set_tier(&self, tier: QualityTier) {
        let previous = self.config.rcu(|current| {
            let mut next = PipelineConfig::clone(current);
            next.quality_tier = tier;
            next
        });
        if previous.quality_tier != tier {
            info!(from = %previous.quality_tier, to = %tier, "quality tier changed");
        }
    }

    /// Replace every setting at once after validation.
    pub fn configure(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        info!(?config, "pipeline reconfigured");
        self.config.store(Arc::new(config));
        Ok(())
    }

    pub fn resolve(&self) -> StageSet {
        self.tier().stages()
    }

    /// Immutable view of the settings for one frame.
    pub fn snapshot(&self) -> Arc<PipelineConfig> {
        self.config.load_full()
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self {
            config: ArcSwap::from_pointee(PipelineConfig::default()),
        }
    }
}
