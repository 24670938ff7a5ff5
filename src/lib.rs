#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # shadergen
//!
//! Template-driven shader source generation.
//!
//! A template is shader source annotated with `/// IF` feature conditions,
//! a `#PROPERTIES_NEW` block declaring configurable values, `#KEYWORDS`
//! rules and `[[TAG]]` placeholders. [`ShaderGenerator::generate`] reduces
//! it for a [`GeneratorConfig`], resolves property references, packs
//! interpolants and emits the final text.
//!
//! ```rust,ignore
//! use shadergen::{GeneratorConfig, ModuleLibrary, ShaderGenerator};
//!
//! let generator = ShaderGenerator::new(ModuleLibrary::new());
//! let config = GeneratorConfig::new("Custom/Toon").with_features(["RIM"]);
//! let output = generator.generate(&template, &config);
//! for (message, line) in output.messages() {
//!     eprintln!("{message} ({line:?})");
//! }
//! ```

pub use shadergen_codegen as codegen;
pub use shadergen_properties as properties;
pub use shadergen_template as template;

pub use shadergen_codegen::{
    content_hash, verify_stamp, CodeEmitter, GenerationContext, GenerationOutput, GeneratorConfig, OutputFormat,
    ShaderGenerator,
};
pub use shadergen_core::{Diagnostic, Diagnostics, FeatureSet, Result, ShaderGenError};
pub use shadergen_properties::{
    CustomMaterialProperty, Implementation, ImplementationKind, InterpolantPacker, NamedVariable, PackedInterpolants,
    Property, PropertyGraph, PropertyId, SwizzleStyle,
};
pub use shadergen_template::{
    reduce, ConditionEvaluator, Expr, ModuleLibrary, PassFeatures, TemplateLine, TemplateReducer,
};
