//! # shadergen_core
//!
//! Foundational types shared by every shadergen crate:
//!
//! - [`errors`]: the [`ShaderGenError`] enum and [`Result`] alias
//! - [`diagnostics`]: the `(message, line)` list surfaced to callers
//! - [`features`]: [`FeatureSet`], the tokens that drive template conditions
//! - [`text`]: line and option parsing helpers

pub mod diagnostics;
pub mod errors;
pub mod features;
pub mod text;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use errors::{ReferenceRejection, Result, ShaderGenError};
pub use features::FeatureSet;
