//! # shadergen_properties
//!
//! The property model of a template:
//!
//! - [`types`]: value types, program stages and operators
//! - [`implementation`]: the closed set of implementation kinds and their emission
//! - [`property`]: properties and the declaration line parser
//! - [`graph`]: the property arena, reference edges and sampling order
//! - [`packer`]: vertex-to-fragment interpolant packing

pub mod graph;
pub mod implementation;
pub mod packer;
pub mod property;
pub mod types;

pub use graph::{PropertyGraph, PropertyId};
pub use implementation::{
    CustomMaterialProperty, EmitEnv, HsvMode, Implementation, ImplementationKind, TextureSource, UvSource,
};
pub use packer::{InterpolantPacker, NamedVariable, PackGroup, PackedInterpolants, SwizzleStyle};
pub use property::{Property, PropertyFlags, MAX_PASSES};
pub use types::{Operator, ProgramStage, ValueType};
