#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use llama_session::{InferenceBackend, LlamaEngine, LoadConfig, SamplerStage, Token, TunedParams};

pub const BOS: Token = 1;
pub const EOG: Token = 2;
const FIRST_PIECE: Token = 100;

/// Global init calls across every `MockBackend` in the test binary
pub static INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

/// What the mock engine does
#[derive(Debug, Clone)]
pub struct Script {
    /// Fragments produced in order; the end-of-generation token follows them
    pub pieces: Vec<String>,
    pub parameter_count: u64,
    pub chat_template: Option<String>,
    pub fail_template: bool,
    pub fail_load: bool,
    pub fail_context: bool,
    pub fail_tokenize: bool,
    pub fail_prompt_decode: bool,
    /// Index of the generated-token decode that fails
    pub fail_decode_at: Option<usize>,
    pub decode_delay: Duration,
    /// Spent in the tokenizer before it succeeds or fails
    pub tokenize_delay: Duration,
    pub panic_on_sample: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            pieces: pieces(&["Hello", ",", " world", "!"]),
            parameter_count: 1_000_000_000,
            chat_template: None,
            fail_template: false,
            fail_load: false,
            fail_context: false,
            fail_tokenize: false,
            fail_prompt_decode: false,
            fail_decode_at: None,
            decode_delay: Duration::ZERO,
            tokenize_delay: Duration::ZERO,
            panic_on_sample: false,
        }
    }
}

pub fn pieces(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `count` distinct fragments
pub fn numbered_pieces(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("t{} ", i)).collect()
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

struct Shared {
    script: Script,
    events: EventLog,
    prompts: Mutex<Vec<String>>,
    chains: Mutex<Vec<Vec<SamplerStage>>>,
    resets: AtomicUsize,
}

/// Scripted stand-in for the inference engine. Clones share state, so a
/// test can keep one to inspect what the engine did.
#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new(script: Script) -> Self {
        Self {
            shared: Arc::new(Shared {
                script,
                events: Arc::new(Mutex::new(Vec::new())),
                prompts: Mutex::new(Vec::new()),
                chains: Mutex::new(Vec::new()),
                resets: AtomicUsize::new(0),
            }),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.shared.events.lock().clone()
    }

    /// Texts handed to the tokenizer, in order
    pub fn prompts(&self) -> Vec<String> {
        self.shared.prompts.lock().clone()
    }

    /// Stage lists of every chain built, in order
    pub fn chains(&self) -> Vec<Vec<SamplerStage>> {
        self.shared.chains.lock().clone()
    }

    pub fn resets(&self) -> usize {
        self.shared.resets.load(Ordering::SeqCst)
    }

    /// The full text the script produces when nothing fails
    pub fn full_text(&self) -> String {
        self.shared.script.pieces.concat()
    }

    fn log(&self, event: &str) {
        self.shared.events.lock().push(event.to_string());
    }
}

pub struct MockModel {
    events: EventLog,
    parameter_count: u64,
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.events.lock().push("free_model".to_string());
    }
}

pub struct MockContext {
    events: EventLog,
    context_length: u32,
    generated_decodes: usize,
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.events.lock().push("free_context".to_string());
    }
}

pub struct MockSampler {
    events: EventLog,
    cursor: usize,
}

impl Drop for MockSampler {
    fn drop(&mut self) {
        self.events.lock().push("free_sampler".to_string());
    }
}

impl InferenceBackend for MockBackend {
    type Model = MockModel;
    type Context = MockContext;
    type Sampler = MockSampler;

    fn init(&self) {
        INIT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn load_model(&self, path: &Path, _gpu_layers: u32) -> anyhow::Result<MockModel> {
        if self.shared.script.fail_load {
            bail!("cannot map {}", path.display());
        }
        self.log("load_model");
        Ok(MockModel {
            events: self.shared.events.clone(),
            parameter_count: self.shared.script.parameter_count,
        })
    }

    fn parameter_count(&self, model: &MockModel) -> u64 {
        model.parameter_count
    }

    fn create_context(&self, _model: &MockModel, params: &TunedParams) -> anyhow::Result<MockContext> {
        if self.shared.script.fail_context {
            bail!("out of memory for {} tokens", params.context_length);
        }
        self.log("create_context");
        Ok(MockContext {
            events: self.shared.events.clone(),
            context_length: params.context_length,
            generated_decodes: 0,
        })
    }

    fn context_length(&self, context: &MockContext) -> u32 {
        context.context_length
    }

    fn chat_template(&self, _model: &MockModel) -> Option<String> {
        self.shared.script.chat_template.clone()
    }

    fn apply_chat_template(&self, _template: &str, role: &str, content: &str) -> anyhow::Result<String> {
        if self.shared.script.fail_template {
            return Err(anyhow!("template rejected"));
        }
        Ok(format!("<{}>{}</{}>", role, content, role))
    }

    /// One BOS plus one token per whitespace-separated word
    fn tokenize(&self, _model: &MockModel, text: &str) -> anyhow::Result<Vec<Token>> {
        if !self.shared.script.tokenize_delay.is_zero() {
            thread::sleep(self.shared.script.tokenize_delay);
        }
        if self.shared.script.fail_tokenize {
            bail!("vocabulary mismatch");
        }
        self.shared.prompts.lock().push(text.to_string());

        let words = text.split_whitespace().count();
        if words == 0 {
            return Ok(Vec::new());
        }
        let mut tokens = vec![BOS];
        tokens.extend(std::iter::repeat(3).take(words));
        Ok(tokens)
    }

    fn decode(&self, context: &mut MockContext, tokens: &[Token]) -> anyhow::Result<()> {
        if tokens.first() == Some(&BOS) {
            if self.shared.script.fail_prompt_decode {
                bail!("prompt batch rejected");
            }
            context.generated_decodes = 0;
            return Ok(());
        }

        if !self.shared.script.decode_delay.is_zero() {
            thread::sleep(self.shared.script.decode_delay);
        }
        let index = context.generated_decodes;
        context.generated_decodes += 1;
        if self.shared.script.fail_decode_at == Some(index) {
            bail!("kv cache full");
        }
        Ok(())
    }

    fn build_sampler(&self, _model: &MockModel, stages: &[SamplerStage]) -> MockSampler {
        self.log("build_sampler");
        self.shared.chains.lock().push(stages.to_vec());
        MockSampler {
            events: self.shared.events.clone(),
            cursor: 0,
        }
    }

    fn reset_sampler(&self, sampler: &mut MockSampler) {
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
        sampler.cursor = 0;
    }

    fn sample(&self, sampler: &mut MockSampler, _context: &mut MockContext) -> Token {
        if self.shared.script.panic_on_sample {
            panic!("sampler state corrupted");
        }
        let index = sampler.cursor;
        sampler.cursor += 1;
        if index < self.shared.script.pieces.len() {
            FIRST_PIECE + index as Token
        } else {
            EOG
        }
    }

    fn is_end_of_generation(&self, _model: &MockModel, token: Token) -> bool {
        token == EOG
    }

    fn token_to_text(&self, _model: &MockModel, token: Token) -> anyhow::Result<String> {
        let index = (token - FIRST_PIECE) as usize;
        self.shared
            .script
            .pieces
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("unknown token {}", token))
    }
}

/// A small non-empty file standing in for model weights
pub fn model_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"GGUF fake weights").unwrap();
    file.flush().unwrap();
    file
}

/// Engine with the script loaded from a fresh model file. Keep the returned
/// file alive for as long as the test reloads from it.
pub fn loaded_engine(script: Script) -> (LlamaEngine<MockBackend>, MockBackend, NamedTempFile) {
    let backend = MockBackend::new(script);
    let file = model_file();
    let engine = LlamaEngine::builder(backend.clone())
        .with_hardware_threads(8)
        .build()
        .unwrap();
    engine.load(&LoadConfig::new(file.path())).unwrap();
    (engine, backend, file)
}

/// Poll until the stream is inactive and drained
pub fn drain_stream(engine: &LlamaEngine<MockBackend>, timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut fragments = Vec::new();
    loop {
        if let Some(fragment) = engine.poll_fragment() {
            fragments.push(fragment);
            continue;
        }
        if !engine.is_stream_active() {
            // Nothing is appended once inactive
            while let Some(fragment) = engine.poll_fragment() {
                fragments.push(fragment);
            }
            return fragments;
        }
        assert!(Instant::now() < deadline, "stream did not finish in {:?}", timeout);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Wait until the worker has published its final state
pub fn wait_for_state(engine: &LlamaEngine<MockBackend>, timeout: Duration) -> llama_session::StreamState {
    let deadline = Instant::now() + timeout;
    loop {
        let state = engine.stream_state();
        if state.is_finished() {
            return state;
        }
        assert!(Instant::now() < deadline, "stream stuck in {:?}", state);
        thread::sleep(Duration::from_millis(1));
    }
}
