//! Error Types
//!
//! This module defines the error types used throughout the generator.
//!
//! # Overview
//!
//! The main error type [`ShaderGenError`] covers all failure modes including:
//! - Malformed conditional directives and module markers
//! - Property declaration and reference errors
//! - Emission errors (unknown tags, unresolved lookups)
//!
//! Most of these are *recoverable*: they are recorded in a
//! [`Diagnostics`](crate::diagnostics::Diagnostics) list and generation
//! continues. [`ShaderGenError::is_fatal`] tells which ones abort the pass.
//!
//! # Usage
//!
//! ```rust,ignore
//! use shadergen_core::errors::{ShaderGenError, Result};
//!
//! fn parse_something() -> Result<()> {
//!     Err(ShaderGenError::UnknownProperty("Albedo".into()))
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// Why a reference between two properties was refused.
///
/// The display string is appended to the refusal message, e.g.
/// `'Specular' can't reference 'Albedo' (different pass)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRejection {
    /// One of the two properties is a hook.
    Hook,
    /// The target only exists at the fixed-function level.
    FixedFunction,
    /// A property can't reference itself.
    SelfReference,
    /// The two properties don't share any pass.
    DifferentPass,
    /// The target lives in another program stage.
    DifferentStage(String),
    /// The source declared it can't reference other properties.
    SourceCantReference,
    /// The target opted out of being referenced, with its reason.
    Prevented(String),
}

impl fmt::Display for ReferenceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hook => write!(f, "(hook)"),
            Self::FixedFunction => write!(f, "(fixed function)"),
            Self::SelfReference => write!(f, "(self reference)"),
            Self::DifferentPass => write!(f, "(different pass)"),
            Self::DifferentStage(stage) => write!(f, "({stage} shader)"),
            Self::SourceCantReference => write!(f, "(can't reference other properties)"),
            Self::Prevented(reason) => write!(f, "{reason}"),
        }
    }
}

/// The main error type for the generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderGenError {
    // ========================================================================
    // Conditional Directive Errors
    // ========================================================================
    /// A directive without a usable expression, e.g. `/// IF` alone.
    #[error("Invalid condition block: '{0}'")]
    InvalidCondition(String),

    /// A token that is neither a feature name nor an operator.
    #[error("Unknown token '{token}' in condition '{expression}'")]
    UnknownToken {
        /// The offending token
        token: String,
        /// The whole expression text
        expression: String,
    },

    /// `ELSE`, `ELIF` or an ending `///` found outside of any IF block.
    #[error("Found '{0}' without a matching IF")]
    UnmatchedDirective(String),

    /// The template ended with IF blocks still open.
    #[error("Missing {count} ending '///' tag(s), last opened at line {line}")]
    UnterminatedCondition {
        /// Number of blocks still open
        count: usize,
        /// Line of the innermost unclosed IF
        line: usize,
    },

    // ========================================================================
    // Module Errors
    // ========================================================================
    /// A module marker names a module that isn't loaded.
    #[error("Can't find module '{0}'")]
    ModuleNotFound(String),

    /// A module marker names a block the module doesn't define.
    #[error("Can't find block '{block}' in module '{module}'")]
    ModuleBlockNotFound {
        /// Module name
        module: String,
        /// Requested block, e.g. `VERTEX:key`
        block: String,
    },

    /// A module function was called with the wrong number of arguments.
    #[error("Invalid argument count for module '{module}': expected {expected}, got {found}")]
    ModuleArgumentMismatch {
        /// Module name
        module: String,
        /// Declared parameters
        expected: usize,
        /// Supplied arguments
        found: usize,
    },

    /// Unparseable `[[MODULE:...]]` marker.
    #[error("Invalid module marker: '{0}'")]
    InvalidModuleMarker(String),

    // ========================================================================
    // Property Errors
    // ========================================================================
    /// Unparseable line in a property declaration block.
    #[error("Invalid shader property declaration: {0}")]
    InvalidPropertyDeclaration(String),

    /// `imp(kind, ...)` with a kind that doesn't exist.
    #[error("Unrecognized implementation kind: '{0}'")]
    UnknownImplementation(String),

    /// A tag or implementation names a property absent from the graph.
    #[error("Can't find shader property '{0}'")]
    UnknownProperty(String),

    /// The reference validity rules refused a link.
    #[error("'{from}' can't reference '{to}' {reason}")]
    InvalidReference {
        /// Referencing property
        from: String,
        /// Referenced property
        to: String,
        /// Refusal reason
        reason: ReferenceRejection,
    },

    /// The link would close a cycle; it was not installed.
    #[error("Cyclic reference: '{from}' can't reference '{to}'")]
    CyclicReference {
        /// Referencing property
        from: String,
        /// Referenced property
        to: String,
    },

    /// Every implementation of a property was dropped or skipped.
    #[error("Shader property '{0}' has no usable implementation")]
    EmptyExpression(String),

    /// A cycle was found while ordering samples despite link-time checks.
    #[error("Internal consistency error: cyclic reference found while sorting '{0}'")]
    SamplingOrderCycle(String),

    // ========================================================================
    // Emission Errors
    // ========================================================================
    /// A `[[TAG]]` the emitter doesn't know.
    #[error("Unknown tag: '{0}'")]
    UnknownTag(String),

    /// A `[[` without its closing `]]`.
    #[error("Unclosed tag in line '{0}'")]
    UnclosedTag(String),

    /// A texture sampled from a UV channel that isn't available.
    #[error("Can't find UV coordinates for shader property '{0}'")]
    MissingTexcoord(String),

    /// Collapsible block markers out of order.
    #[error("Unbalanced '{0}' marker")]
    UnbalancedBlock(String),
}

impl ShaderGenError {
    /// Returns `true` for errors that abort the current generation pass.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownProperty(_) | Self::SamplingOrderCycle(_)
        )
    }
}

/// Alias for `Result<T, ShaderGenError>`.
pub type Result<T> = std::result::Result<T, ShaderGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ShaderGenError::UnknownProperty("A".into()).is_fatal());
        assert!(ShaderGenError::SamplingOrderCycle("A".into()).is_fatal());
        assert!(!ShaderGenError::UnknownTag("FOO".into()).is_fatal());
        assert!(!ShaderGenError::ModuleNotFound("Rim".into()).is_fatal());
        assert!(!ShaderGenError::EmptyExpression("Rim".into()).is_fatal());
    }

    #[test]
    fn test_reference_message() {
        let err = ShaderGenError::InvalidReference {
            from: "Specular".into(),
            to: "Albedo".into(),
            reason: ReferenceRejection::DifferentStage("vertex".into()),
        };
        assert_eq!(err.to_string(), "'Specular' can't reference 'Albedo' (vertex shader)");
    }
}
