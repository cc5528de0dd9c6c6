//! Engine module providing the caller-facing session manager

mod builder;
mod engine;
mod session;

pub use builder::EngineBuilder;
pub use engine::LlamaEngine;
