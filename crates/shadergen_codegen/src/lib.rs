//! # shadergen_codegen
//!
//! Turns a reduced template into shader source:
//!
//! - [`config`]: what the caller chose ([`GeneratorConfig`])
//! - [`context`]: the per-request [`GenerationContext`] and per-pass state
//! - [`tags`]: `[[TAG]]` parsing
//! - [`emitter`]: the line walker ([`CodeEmitter`])
//! - [`postprocess`]: blank line collapsing, header stripping and the content stamp
//! - [`generator`]: the end-to-end [`ShaderGenerator`]

pub mod config;
pub mod context;
pub mod emitter;
pub mod generator;
pub mod postprocess;
pub mod tags;

pub use config::{GeneratorConfig, OutputFormat};
pub use context::{GenerationContext, PassState};
pub use emitter::CodeEmitter;
pub use generator::{GenerationOutput, PreparedTemplate, ShaderGenerator};
pub use postprocess::{content_hash, post_process, stamp, stamped_config, verify_stamp};
pub use tags::{SampleOptions, Tag, VariableBlock};
