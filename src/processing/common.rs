// Location: src/processing/common.rs

use crate::{
    error::{describe, EngineError, Result},
    model::{InferenceBackend, CHAT_ROLE_USER},
    types::FinishReason,
};

/// Budget used when the caller asked for "auto" and no context is available
pub const UNBOUNDED_SAFETY_CAP: usize = 1024;

/// Mutable decode state of a session: the context and its sampler chain.
/// The chain exists for as long as the context does. Field order is drop
/// order.
pub(crate) struct DecodeState<B: InferenceBackend> {
    pub sampler: B::Sampler,
    pub context: B::Context,
}

/// How many tokens a generation may produce.
///
/// A positive request is honoured verbatim. Otherwise the budget is the
/// context headroom left after the prompt, capped at 1024; with no headroom
/// one token is still attempted. A `context_length` of 0 means no context.
pub fn resolve_target_tokens(requested: i32, prompt_tokens: usize, context_length: u32) -> usize {
    if requested > 0 {
        return requested as usize;
    }
    if context_length == 0 {
        return UNBOUNDED_SAFETY_CAP;
    }
    let available = context_length as i64 - prompt_tokens as i64;
    if available <= 0 {
        return 1;
    }
    UNBOUNDED_SAFETY_CAP.min(available as usize)
}

/// Run the prompt through the model's chat template, falling back to the
/// raw prompt when there is no template or formatting fails
pub(crate) fn format_prompt<B: InferenceBackend>(backend: &B, model: &B::Model, prompt: &str) -> String {
    let template = match backend.chat_template(model) {
        Some(template) if !template.is_empty() => template,
        _ => return prompt.to_string(),
    };

    match backend.apply_chat_template(&template, CHAT_ROLE_USER, prompt) {
        Ok(formatted) if !formatted.is_empty() => formatted,
        Ok(_) => prompt.to_string(),
        Err(e) => {
            tracing::debug!(error = %describe(&e), "Chat template failed, using raw prompt");
            prompt.to_string()
        }
    }
}

/// Format, tokenize and decode the prompt as one batch.
/// Returns the number of prompt tokens.
pub(crate) fn prepare_prompt<B: InferenceBackend>(
    backend: &B,
    model: &B::Model,
    context: &mut B::Context,
    prompt: &str,
) -> Result<usize> {
    let formatted = format_prompt(backend, model, prompt);

    let tokens = backend.tokenize(model, &formatted).map_err(|e| EngineError::TokenizationError {
        message: describe(&e),
    })?;
    if tokens.is_empty() {
        return Err(EngineError::TokenizationError {
            message: "prompt produced no tokens".to_string(),
        });
    }

    backend.decode(context, &tokens).map_err(|e| EngineError::DecodeError {
        message: format!("prompt batch of {} tokens: {}", tokens.len(), describe(&e)),
    })?;

    Ok(tokens.len())
}

/// Make the chain ready for a new generation: install a freshly built chain
/// if one is waiting, otherwise reset the current chain so stateful stages
/// start clean.
pub(crate) fn prepare_sampler<'a, B: InferenceBackend>(
    backend: &B,
    slot: &'a mut B::Sampler,
    pending: Option<B::Sampler>,
) -> &'a mut B::Sampler {
    match pending {
        Some(fresh) => *slot = fresh,
        None => backend.reset_sampler(slot),
    }
    slot
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopOutcome {
    pub generated: usize,
    pub finish_reason: FinishReason,
}

/// Per-token generation loop shared by the blocking and streaming paths.
///
/// `should_stop` is consulted before each sample; `emit` receives each
/// fragment and returns false to stop. A fragment is emitted before the
/// token is decoded, so a decode failure keeps the last fragment.
pub(crate) fn run_decode_loop<B: InferenceBackend>(
    backend: &B,
    model: &B::Model,
    sampler: &mut B::Sampler,
    context: &mut B::Context,
    budget: usize,
    mut should_stop: impl FnMut() -> bool,
    mut emit: impl FnMut(String) -> bool,
) -> LoopOutcome {
    let mut generated = 0;
    let outcome = |generated, finish_reason| LoopOutcome { generated, finish_reason };

    while generated < budget {
        if should_stop() {
            return outcome(generated, FinishReason::Cancelled);
        }

        let token = backend.sample(sampler, context);
        if backend.is_end_of_generation(model, token) {
            tracing::debug!(generated, "End of generation reached");
            return outcome(generated, FinishReason::EndOfGeneration);
        }

        let piece = match backend.token_to_text(model, token) {
            Ok(piece) if !piece.is_empty() => piece,
            Ok(_) => {
                tracing::warn!(token, "Token converted to an empty piece");
                return outcome(generated, FinishReason::Error);
            }
            Err(e) => {
                tracing::warn!(token, error = %describe(&e), "Token to text failed");
                return outcome(generated, FinishReason::Error);
            }
        };
        if !emit(piece) {
            return outcome(generated, FinishReason::Cancelled);
        }

        if let Err(e) = backend.decode(context, &[token]) {
            tracing::warn!(token, error = %describe(&e), "Decode of generated token failed");
            return outcome(generated, FinishReason::Error);
        }
        generated += 1;
    }

    outcome(generated, FinishReason::TokenBudget)
}
