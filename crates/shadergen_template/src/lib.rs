//! # shadergen_template
//!
//! Line-level template processing:
//!
//! - [`expression`]: `A && !(B || C)` condition expressions
//! - [`condition`]: the `/// IF` ... `///` automaton
//! - [`module`]: reusable module files and `[[MODULE:...]]` markers
//! - [`reducer`]: module expansion + condition reduction into [`TemplateLine`]s
//! - [`keywords`]: the `#KEYWORDS` block
//! - [`metadata`]: property block, pass usage and input variable scanning

pub mod condition;
pub mod expression;
pub mod keywords;
pub mod metadata;
pub mod module;
pub mod reducer;

pub use condition::{ConditionEvaluator, ConditionFrame, Directive, LineDecision};
pub use expression::Expr;
pub use keywords::{process_keywords, KeywordCommand, KeywordState};
pub use metadata::{TemplateHeader, ValueUsage};
pub use module::{Module, ModuleBlock, ModuleLibrary, ModuleMarker};
pub use reducer::{reduce, PassFeatures, ReducedTemplate, TemplateLine, TemplateReducer};
