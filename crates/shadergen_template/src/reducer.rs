//! Template reduction: module expansion followed by condition stripping.
//!
//! ```text
//! raw text ──► expand_modules ──► [TemplateLine] ──► reduce_lines ──► [TemplateLine]
//!              (#MODULES list,                       (/// directives,
//!               [[MODULE:..]] markers)                consumed blocks,
//!                                                     per-pass features)
//! ```
//!
//! Every surviving line keeps the 1-based number of the raw line it came
//! from; lines spliced from a module carry the number of their marker.

use rustc_hash::FxHashSet;
use shadergen_core::{text, Diagnostics, FeatureSet, ShaderGenError};

use crate::condition::{ConditionEvaluator, LineDecision};
use crate::module::{MarkerKind, ModuleBlock, ModuleLibrary, ModuleMarker};

/// Blocks holding metadata for other subsystems; never emitted.
pub const CONSUMED_BLOCKS: [&str; 4] = ["#FEATURES", "#PROPERTIES_NEW", "#KEYWORDS", "#MODULES"];

pub const END_MARKER: &str = "#END";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLine {
    pub text: String,
    /// 1-based number of the originating raw line.
    pub line_number: usize,
}

impl TemplateLine {
    pub fn new(text: impl Into<String>, line_number: usize) -> Self {
        Self {
            text: text.into(),
            line_number,
        }
    }
}

/// Splits raw template text into numbered lines (`\r\n` and `\n` both end a line).
#[must_use]
pub fn split_lines(raw: &str) -> Vec<TemplateLine> {
    raw.lines()
        .enumerate()
        .map(|(i, line)| TemplateLine::new(line, i + 1))
        .collect()
}

/// `#PASS`, possibly among other comma separated marker tags.
#[must_use]
pub fn is_pass_marker(text: &str) -> bool {
    text.strip_prefix('#')
        .is_some_and(|rest| rest.split(',').any(|tag| tag.trim() == "PASS"))
}

/// Start line of a block listed in [`CONSUMED_BLOCKS`].
#[must_use]
pub fn is_consumed_block(text: &str) -> bool {
    CONSUMED_BLOCKS.iter().any(|marker| text.starts_with(marker))
}

/// Feature sets used while reducing: one before the first `#PASS`, then one per pass.
///
/// A pass without its own set falls back to the global one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassFeatures {
    pub global: FeatureSet,
    pub passes: Vec<FeatureSet>,
}

impl PassFeatures {
    #[must_use]
    pub fn new(global: FeatureSet, passes: Vec<FeatureSet>) -> Self {
        Self { global, passes }
    }

    /// Same set everywhere.
    #[must_use]
    pub fn uniform(features: FeatureSet) -> Self {
        Self {
            global: features,
            passes: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_pass(&self, pass: Option<usize>) -> &FeatureSet {
        pass.and_then(|p| self.passes.get(p)).unwrap_or(&self.global)
    }
}

/// Result of a reduction: surviving lines plus everything reported on the way.
#[derive(Debug, Clone, Default)]
pub struct ReducedTemplate {
    pub lines: Vec<TemplateLine>,
    pub diagnostics: Diagnostics,
}

/// Drives module expansion and the [`ConditionEvaluator`] over a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateReducer<'a> {
    modules: &'a ModuleLibrary,
}

impl<'a> TemplateReducer<'a> {
    #[must_use]
    pub fn new(modules: &'a ModuleLibrary) -> Self {
        Self { modules }
    }

    /// Names listed in the template's `#MODULES` block, in order. Names
    /// missing from the library are reported and left out.
    pub fn module_list(&self, lines: &[TemplateLine], diagnostics: &mut Diagnostics) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut in_block = false;

        for line in lines {
            let trimmed = line.text.trim();
            if !in_block {
                in_block = line.text.starts_with("#MODULES");
                continue;
            }
            if trimmed == END_MARKER {
                in_block = false;
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#') {
                continue;
            }
            if !self.modules.contains(trimmed) {
                diagnostics.push(ShaderGenError::ModuleNotFound(trimmed.to_string()), line.line_number);
            } else if !names.iter().any(|n| n == trimmed) {
                names.push(trimmed.to_string());
            }
        }
        names
    }

    /// Replaces every `[[MODULE:...]]` line with the requested module lines,
    /// prefixed with the marker's indentation.
    pub fn expand_modules(&self, raw: &str, diagnostics: &mut Diagnostics) -> Vec<TemplateLine> {
        let lines = split_lines(raw);
        let listed = self.module_list(&lines, diagnostics);

        let mut spliced: FxHashSet<(ModuleBlock, String)> = FxHashSet::default();
        let mut output = Vec::with_capacity(lines.len());

        for line in lines {
            let marker = match ModuleMarker::parse(&line.text) {
                Ok(Some(marker)) => marker,
                Ok(None) => {
                    output.push(line);
                    continue;
                }
                Err(err) => {
                    diagnostics.push(err, line.line_number);
                    continue;
                }
            };

            let indent = text::leading_whitespace(&line.text);
            match self.marker_lines(&marker, &listed, &mut spliced) {
                Ok(block) => {
                    output.extend(block.into_iter().map(|l| {
                        TemplateLine::new(indent_module_line(indent, &l), line.line_number)
                    }));
                }
                Err(err) => diagnostics.push(err, line.line_number),
            }
        }

        log::debug!("Expanded {} modules into {} lines", listed.len(), output.len());
        output
    }

    fn marker_lines(
        &self,
        marker: &ModuleMarker,
        listed: &[String],
        spliced: &mut FxHashSet<(ModuleBlock, String)>,
    ) -> shadergen_core::Result<Vec<String>> {
        let module = match &marker.module {
            Some(name) if listed.contains(name) => self.modules.get(name),
            Some(name) => return Err(ShaderGenError::ModuleNotFound(name.clone())),
            None => None,
        };

        match (marker.kind, module) {
            (MarkerKind::Vertex, Some(module)) => module.vertex_lines(&marker.key, &marker.arguments),
            (MarkerKind::Fragment, Some(module)) => module.fragment_lines(&marker.key, &marker.arguments),
            (MarkerKind::Block(block), Some(module)) => {
                spliced.insert((block, module.name().to_string()));
                Ok(module.block(block).to_vec())
            }
            (MarkerKind::Block(block), None) => {
                let mut lines = Vec::new();
                for name in listed {
                    if spliced.contains(&(block, name.clone())) {
                        continue;
                    }
                    if let Some(module) = self.modules.get(name) {
                        lines.extend_from_slice(module.block(block));
                    }
                }
                Ok(lines)
            }
            (_, None) => Err(ShaderGenError::InvalidModuleMarker(format!("{marker:?}"))),
        }
    }

    /// Condition reduction over already expanded lines.
    ///
    /// The feature set switches at every kept `#PASS` line.
    pub fn reduce_lines(
        &self,
        lines: &[TemplateLine],
        features: &PassFeatures,
        diagnostics: &mut Diagnostics,
    ) -> Vec<TemplateLine> {
        let mut evaluator = ConditionEvaluator::new();
        let mut pass: Option<usize> = None;
        let mut current = features.for_pass(pass);
        let mut output = Vec::with_capacity(lines.len());

        let mut iter = lines.iter();
        while let Some(line) = iter.next() {
            if is_consumed_block(&line.text) {
                for inner in iter.by_ref() {
                    if inner.text.trim() == END_MARKER {
                        break;
                    }
                }
                continue;
            }

            match evaluator.evaluate(&line.text, line.line_number, current, diagnostics) {
                LineDecision::Keep => {
                    if is_pass_marker(&line.text) {
                        let next = pass.map_or(0, |p| p + 1);
                        pass = Some(next);
                        current = features.for_pass(pass);
                        log::trace!("line {}: pass {next}", line.line_number);
                    }
                    output.push(line.clone());
                }
                LineDecision::Skip | LineDecision::Directive => {}
            }
        }

        evaluator.finish(diagnostics);
        output
    }

    /// Expands modules and reduces with a single feature set.
    #[must_use]
    pub fn reduce(&self, raw: &str, features: &FeatureSet) -> ReducedTemplate {
        self.reduce_passes(raw, &PassFeatures::uniform(features.clone()))
    }

    /// Expands modules and reduces with per-pass feature sets.
    #[must_use]
    pub fn reduce_passes(&self, raw: &str, features: &PassFeatures) -> ReducedTemplate {
        let mut diagnostics = Diagnostics::new();
        let expanded = self.expand_modules(raw, &mut diagnostics);
        let lines = self.reduce_lines(&expanded, features, &mut diagnostics);
        ReducedTemplate { lines, diagnostics }
    }
}

/// `#ENABLE_IMPL`-style lines stay unindented, empty lines stay empty.
fn indent_module_line(indent: &str, line: &str) -> String {
    if line.is_empty() || (line.starts_with('#') && line.contains("_IMPL")) {
        line.to_string()
    } else {
        format!("{indent}{line}")
    }
}

/// Free-function form of [`TemplateReducer::reduce`].
#[must_use]
pub fn reduce(raw: &str, modules: &ModuleLibrary, features: &FeatureSet) -> ReducedTemplate {
    TemplateReducer::new(modules).reduce(raw, features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[TemplateLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_reduce_keeps_line_numbers() {
        let raw = "a\n/// IF X\nb\n/// ELSE\nc\n///\nd";
        let modules = ModuleLibrary::new();
        let reduced = reduce(raw, &modules, &FeatureSet::from_tokens(["X"]));

        assert_eq!(texts(&reduced.lines), vec!["a", "b", "d"]);
        let numbers: Vec<_> = reduced.lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 3, 7]);
        assert!(reduced.diagnostics.is_empty());
    }

    #[test]
    fn test_consumed_blocks_are_skipped() {
        let raw = "#FEATURES\nsng\tlbl=\"Rim\"\n#END\n#PROPERTIES_NEW\nfloat\tRim\tfragment\n#END\nShader\n#KEYWORDS\nfeature_on\tX\n#END\nend";
        let reduced = reduce(raw, &ModuleLibrary::new(), &FeatureSet::new());
        assert_eq!(texts(&reduced.lines), vec!["Shader", "end"]);
    }

    #[test]
    fn test_per_pass_features() {
        let raw = "/// IF P\nglobal\n///\n#PASS\n/// IF P\nfirst\n///\n#PASS\n/// IF P\nsecond\n///";
        let features = PassFeatures::new(
            FeatureSet::new(),
            vec![FeatureSet::from_tokens(["P"]), FeatureSet::new()],
        );
        let reduced = TemplateReducer::new(&ModuleLibrary::new()).reduce_passes(raw, &features);
        assert_eq!(texts(&reduced.lines), vec!["#PASS", "first", "#PASS"]);
    }

    #[test]
    fn test_module_expansion() {
        let mut modules = ModuleLibrary::new();
        modules
            .load("Rim", "#VARIABLES\nfloat _RimMin;\n#END\n#FRAGMENT(float3 n)\nrim = dot(n, v);\n#END")
            .unwrap();
        modules.load("Outline", "#VARIABLES\nfloat _Outline;\n#END").unwrap();

        let raw = "#MODULES\nRim\nOutline\n#END\n\t[[MODULE:VARIABLES:Rim]]\n\t\t[[MODULE:VARIABLES]]\n\t[[MODULE:FRAGMENT:Rim(input.normal)]]\n[[MODULE:VARIABLES:Missing]]";
        let mut diagnostics = Diagnostics::new();
        let expanded = TemplateReducer::new(&modules).expand_modules(raw, &mut diagnostics);

        let body: Vec<_> = expanded.iter().skip(4).map(|l| (l.text.as_str(), l.line_number)).collect();
        assert_eq!(
            body,
            vec![
                ("\tfloat _RimMin;", 5),
                ("\t\tfloat _Outline;", 6),
                ("\trim = dot(input.normal, v);", 7),
            ]
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics.iter().next().unwrap().error,
            ShaderGenError::ModuleNotFound("Missing".into())
        );
    }

    #[test]
    fn test_unlisted_module_reported() {
        let mut modules = ModuleLibrary::new();
        modules.load("Rim", "#FUNCTIONS\nvoid f(){}\n#END").unwrap();

        let reduced = reduce("[[MODULE:FUNCTIONS:Rim]]\nx", &modules, &FeatureSet::new());
        assert_eq!(texts(&reduced.lines), vec!["x"]);
        assert_eq!(reduced.diagnostics.messages()[0].1, Some(1));
    }

    #[test]
    fn test_pass_marker_detection() {
        assert!(is_pass_marker("#PASS"));
        assert!(is_pass_marker("#VERTEX, PASS"));
        assert!(!is_pass_marker("\t#PASS"));
        assert!(!is_pass_marker("#PASSTHROUGH"));
    }
}
