// Location: src/processing/blocking.rs

use std::time::Instant;

use crate::{
    model::InferenceBackend,
    types::GenerationOutput,
};

use super::common::{prepare_prompt, prepare_sampler, resolve_target_tokens, run_decode_loop, DecodeState};

/// Everything a blocking generation needs besides the decode state
pub(crate) struct BlockingJob<'a, B: InferenceBackend> {
    pub backend: &'a B,
    pub model: &'a B::Model,
    pub pending_sampler: Option<B::Sampler>,
    pub context_length: u32,
    pub prompt: &'a str,
    pub max_tokens: i32,
}

/// Generate a full completion on the calling thread.
///
/// Failures before the first token yield an empty output with
/// `FinishReason::Error`; later failures keep the text produced so far.
pub(crate) fn generate_blocking<B: InferenceBackend>(
    job: BlockingJob<'_, B>,
    state: &mut DecodeState<B>,
) -> GenerationOutput {
    let started = Instant::now();
    let DecodeState { sampler, context } = state;
    let sampler = prepare_sampler(job.backend, sampler, job.pending_sampler);

    let prompt_tokens = match prepare_prompt(job.backend, job.model, context, job.prompt) {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Generation aborted before the first token");
            return GenerationOutput::failed(0, started.elapsed());
        }
    };

    let budget = resolve_target_tokens(job.max_tokens, prompt_tokens, job.context_length);
    tracing::debug!(prompt_tokens, budget, "Prompt decoded");

    let mut text = String::new();
    let outcome = run_decode_loop(
        job.backend,
        job.model,
        sampler,
        context,
        budget,
        || false,
        |piece| {
            text.push_str(&piece);
            true
        },
    );

    tracing::info!(
        tokens = outcome.generated,
        finish_reason = ?outcome.finish_reason,
        "Generation done"
    );

    GenerationOutput {
        text,
        prompt_tokens,
        tokens_generated: outcome.generated,
        finish_reason: outcome.finish_reason,
        processing_time: started.elapsed(),
    }
}
