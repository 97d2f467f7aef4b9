//! Render settings

use std::path::Path;

use pf_core::ChannelConfig;
use pf_dsp::{
    DitherBits, DitherShape, LatencyProfile, LimiterConfig, LimiterHandle, LimiterStyle,
    MAX_BLOCK_SIZE, OversampleFactor, ParamId,
};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Output sample formats the renderer writes
pub const SUPPORTED_OUTPUT_BITS: [u16; 3] = [16, 24, 32];

/// Limiter settings plus output format for one render.
///
/// Missing JSON fields fall back to the defaults, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub input_trim_db: f64,
    pub threshold_db: f64,
    pub ceiling_db: f64,
    pub release_ms: f64,
    pub attack_ms: f64,
    pub lookahead_ms: f64,
    pub style: LimiterStyle,
    /// Ratio: 1, 2, 4, 8, 16 or 32
    pub oversampling: usize,
    /// Percent
    pub stereo_link: f64,
    pub channel_config: ChannelConfig,
    pub mid_side: bool,
    /// Percent
    pub mix: f64,
    /// 0 (off), 8, 12, 16 or 24
    pub dither_bits: u32,
    pub dither_shape: DitherShape,
    pub profile: LatencyProfile,
    /// 16/24 integer or 32 float
    pub output_bits: u16,
    pub block_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            input_trim_db: 0.0,
            threshold_db: 0.0,
            ceiling_db: -1.0,
            release_ms: 100.0,
            attack_ms: 0.1,
            lookahead_ms: 5.0,
            style: LimiterStyle::Allround,
            oversampling: 4,
            stereo_link: 100.0,
            channel_config: ChannelConfig::Stereo,
            mid_side: false,
            mix: 100.0,
            dither_bits: 0,
            dither_shape: DitherShape::Tpdf,
            profile: LatencyProfile::OfflineMax,
            output_bits: 24,
            block_size: 4096,
        }
    }
}

impl RenderConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded render config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RenderResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> RenderResult<()> {
        if OversampleFactor::from_ratio(self.oversampling).is_none() {
            return Err(RenderError::InvalidConfig(format!(
                "oversampling must be 1, 2, 4, 8, 16 or 32 (got {})",
                self.oversampling
            )));
        }
        if DitherBits::from_bits(self.dither_bits).is_none() {
            return Err(RenderError::InvalidConfig(format!(
                "dither_bits must be 0, 8, 12, 16 or 24 (got {})",
                self.dither_bits
            )));
        }
        if !SUPPORTED_OUTPUT_BITS.contains(&self.output_bits) {
            return Err(RenderError::UnsupportedBitDepth(self.output_bits));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(RenderError::InvalidConfig(format!(
                "block_size must be 1..={MAX_BLOCK_SIZE} (got {})",
                self.block_size
            )));
        }
        Ok(())
    }

    pub fn oversample_factor(&self) -> OversampleFactor {
        OversampleFactor::from_ratio(self.oversampling).unwrap_or_default()
    }

    pub fn dither(&self) -> DitherBits {
        DitherBits::from_bits(self.dither_bits).unwrap_or_default()
    }

    pub fn limiter_config(&self, sample_rate: f64) -> LimiterConfig {
        LimiterConfig {
            sample_rate,
            max_block_size: self.block_size,
            dither_shape: self.dither_shape,
            ..LimiterConfig::default()
        }
    }

    /// Write every limiter parameter through the host handle
    pub fn apply(&self, handle: &LimiterHandle) {
        let values = [
            (ParamId::InputTrim, self.input_trim_db),
            (ParamId::Threshold, self.threshold_db),
            (ParamId::Ceiling, self.ceiling_db),
            (ParamId::Release, self.release_ms),
            (ParamId::Attack, self.attack_ms),
            (ParamId::Lookahead, self.lookahead_ms),
            (ParamId::Style, self.style.index() as f64),
            (ParamId::Oversampling, self.oversample_factor().index() as f64),
            (ParamId::StereoLink, self.stereo_link),
            (ParamId::MidSide, if self.mid_side { 1.0 } else { 0.0 }),
            (ParamId::Mix, self.mix),
            (ParamId::DitherBits, self.dither().index() as f64),
            (ParamId::LatencyProfile, self.profile.index() as f64),
            (ParamId::ChannelConfig, self.channel_config.index() as f64),
        ];
        for (id, value) in values {
            if !handle.set_param(id, value) {
                log::warn!("Ignoring non-finite {} = {}", id.spec().name, value);
            }
        }
    }
}
