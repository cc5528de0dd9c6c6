// Location: src/model/tuning.rs

use serde::{Serialize, Deserialize};

/// Models at or below this many parameters get the conservative profile
pub const SMALL_MODEL_PARAM_LIMIT: u64 = 2_000_000_000;

const SMALL_MODEL_CTX_DEFAULT: u32 = 1024;
const SMALL_MODEL_CTX_CAP: u32 = 2048;
const SMALL_MODEL_THREAD_CEIL: u32 = 4;
const SMALL_MODEL_BATCH: u32 = 32;
const DEFAULT_CTX: u32 = 4096;
const DEFAULT_BATCH: u32 = 64;

/// Caller overrides; 0 means "let the tuner decide"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuningOverrides {
    pub context_length: u32,
    pub threads: u32,
    pub batch_size: u32,
}

/// Concrete context parameters derived from model size and hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunedParams {
    pub parameter_count: u64,
    pub small_model: bool,
    pub context_length: u32,
    pub threads: u32,
    pub batch_threads: u32,
    pub batch_size: u32,
}

pub fn is_small_model(parameter_count: u64) -> bool {
    parameter_count > 0 && parameter_count <= SMALL_MODEL_PARAM_LIMIT
}

/// Usable hardware threads, never less than one
pub fn hardware_concurrency() -> u32 {
    num_cpus::get().max(1) as u32
}

/// Map model size, hardware and overrides to context parameters.
///
/// Small models get a shorter context (capped at 2048 even when overridden),
/// at most four decode threads, half as many batch threads and a smaller
/// batch. Every branch yields at least one thread.
pub fn tune(parameter_count: u64, hardware_threads: u32, overrides: TuningOverrides) -> TunedParams {
    let small_model = is_small_model(parameter_count);
    let hardware_threads = hardware_threads.max(1);

    let mut context_length = if overrides.context_length > 0 {
        overrides.context_length
    } else if small_model {
        SMALL_MODEL_CTX_DEFAULT
    } else {
        DEFAULT_CTX
    };
    if small_model && context_length > SMALL_MODEL_CTX_CAP {
        tracing::info!(
            requested = context_length,
            cap = SMALL_MODEL_CTX_CAP,
            "Clamping context length for small model"
        );
        context_length = SMALL_MODEL_CTX_CAP;
    }

    let mut threads = if overrides.threads > 0 {
        overrides.threads
    } else if small_model {
        let capped = hardware_threads.min(SMALL_MODEL_THREAD_CEIL);
        if hardware_threads >= 2 && capped < 2 {
            2
        } else {
            capped
        }
    } else {
        hardware_threads
    };
    threads = threads.max(1);

    let batch_threads = if small_model { (threads / 2).max(1) } else { threads };

    let batch_size = if overrides.batch_size > 0 {
        overrides.batch_size
    } else if small_model {
        SMALL_MODEL_BATCH
    } else {
        DEFAULT_BATCH
    };

    TunedParams {
        parameter_count,
        small_model,
        context_length,
        threads,
        batch_threads,
        batch_size,
    }
}
