// Location: src/model/sampler.rs

use crate::config::{MirostatMode, SamplerConfig};

const DEFAULT_MIROSTAT_TAU: f32 = 5.0;
const DEFAULT_MIROSTAT_ETA: f32 = 0.1;
/// Candidate count mirostat v1 uses to estimate `s_hat`
const MIROSTAT_M: i32 = 100;
const DEFAULT_REPEAT_LAST_N: i32 = 64;

/// One stage of a sampler chain, in backend-neutral form
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerStage {
    MinP { p: f32, min_keep: usize },
    Typical { p: f32, min_keep: usize },
    TopNSigma { n: f32 },
    Mirostat { seed: u32, tau: f32, eta: f32, m: i32 },
    MirostatV2 { seed: u32, tau: f32, eta: f32 },
    Temperature { t: f32 },
    TopK { k: i32 },
    TopP { p: f32, min_keep: usize },
    /// Final draw from the remaining distribution
    Distribution { seed: u32 },
    Penalties { last_n: i32, repeat: f32, frequency: f32, presence: f32 },
}

impl SamplerStage {
    pub fn name(&self) -> &'static str {
        match self {
            SamplerStage::MinP { .. } => "min-p",
            SamplerStage::Typical { .. } => "typical",
            SamplerStage::TopNSigma { .. } => "top-n-sigma",
            SamplerStage::Mirostat { .. } => "mirostat",
            SamplerStage::MirostatV2 { .. } => "mirostat-v2",
            SamplerStage::Temperature { .. } => "temp",
            SamplerStage::TopK { .. } => "top-k",
            SamplerStage::TopP { .. } => "top-p",
            SamplerStage::Distribution { .. } => "dist",
            SamplerStage::Penalties { .. } => "penalties",
        }
    }
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value > 0.0 {
        value
    } else {
        fallback
    }
}

/// Lay out the sampler chain for a configuration.
///
/// Optional filters come first, then mirostat, then the always-present
/// temp / top-k / top-p / dist core. Penalties are appended last when any
/// penalty value is positive.
pub fn build_sampler_stages(config: &SamplerConfig) -> Vec<SamplerStage> {
    let min_keep = if config.min_keep > 0 { config.min_keep as usize } else { 1 };
    let tau = positive_or(config.mirostat_tau, DEFAULT_MIROSTAT_TAU);
    let eta = positive_or(config.mirostat_eta, DEFAULT_MIROSTAT_ETA);

    let mut stages = Vec::with_capacity(10);

    if config.min_p > 0.0 {
        stages.push(SamplerStage::MinP { p: config.min_p, min_keep });
    }
    if config.typical_p > 0.0 {
        stages.push(SamplerStage::Typical { p: config.typical_p, min_keep });
    }
    if config.top_n_sigma > 0.0 {
        stages.push(SamplerStage::TopNSigma { n: config.top_n_sigma });
    }
    match config.mirostat {
        MirostatMode::V1 => stages.push(SamplerStage::Mirostat {
            seed: config.seed,
            tau,
            eta,
            m: MIROSTAT_M,
        }),
        MirostatMode::V2 => stages.push(SamplerStage::MirostatV2 { seed: config.seed, tau, eta }),
        MirostatMode::Disabled => {}
    }

    stages.push(SamplerStage::Temperature { t: config.temperature });
    stages.push(SamplerStage::TopK { k: config.top_k });
    stages.push(SamplerStage::TopP { p: config.top_p, min_keep });
    stages.push(SamplerStage::Distribution { seed: config.seed });

    if config.repeat_penalty > 0.0 || config.frequency_penalty > 0.0 || config.presence_penalty > 0.0 {
        stages.push(SamplerStage::Penalties {
            last_n: if config.repeat_last_n > 0 { config.repeat_last_n } else { DEFAULT_REPEAT_LAST_N },
            repeat: positive_or(config.repeat_penalty, 1.0),
            frequency: positive_or(config.frequency_penalty, 0.0),
            presence: positive_or(config.presence_penalty, 0.0),
        });
    }

    stages
}
