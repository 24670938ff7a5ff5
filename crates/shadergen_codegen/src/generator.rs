//! Shader Generator
//!
//! [`ShaderGenerator`] runs one request end to end:
//!
//! 1. Module expansion and header scan
//! 2. Property graph from the `#PROPERTIES_NEW` block, configured overrides applied
//! 3. `#KEYWORDS` processing over the configured and needed features
//! 4. A first reduction to find which pass reads which property
//! 5. Reference linking, then per-pass feature sets
//! 6. The final per-pass reduction and a usage rescan
//! 7. Emission, post-pass and stamp
//!
//! Fatal errors stop the request: the output has no source, only diagnostics.

use std::collections::BTreeMap;

use shadergen_core::{Diagnostics, FeatureSet, Result};
use shadergen_properties::{PropertyGraph, PropertyId};
use shadergen_template::metadata::{pass_count, property_declarations, value_usages};
use shadergen_template::{
    process_keywords, KeywordState, ModuleLibrary, PassFeatures, TemplateHeader, TemplateLine, TemplateReducer,
};

use crate::config::GeneratorConfig;
use crate::context::GenerationContext;
use crate::emitter::CodeEmitter;
use crate::postprocess::{post_process, stamp};

/// Result of [`ShaderGenerator::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    /// Stamped shader source; `None` when a fatal error occurred.
    pub source: Option<String>,
    pub diagnostics: Diagnostics,
    pub header: TemplateHeader,
}

impl GenerationOutput {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.source.is_some()
    }

    /// `(message, line)` pairs for display.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, Option<usize>)> {
        self.diagnostics.messages()
    }
}

/// A template ready for emission.
#[derive(Debug)]
pub struct PreparedTemplate<'a> {
    pub context: GenerationContext<'a>,
    /// Reduced lines, with their template line numbers.
    pub lines: Vec<TemplateLine>,
    pub header: TemplateHeader,
}

impl PreparedTemplate<'_> {
    /// Emitted text before post-processing.
    pub fn emit(&self, diagnostics: &mut Diagnostics) -> Result<String> {
        CodeEmitter::new(&self.context, &self.lines).emit(diagnostics)
    }

    /// Emits, post-processes and stamps. `None` when a fatal error occurred.
    pub fn render(&self, diagnostics: &mut Diagnostics) -> Option<String> {
        match self.emit(diagnostics) {
            Ok(text) if !diagnostics.has_fatal() => {
                let config = self.context.config;
                let body = post_process(&text, &config.format);
                Some(stamp(&body, config.serialized.as_deref(), &config.format))
            }
            Ok(_) | Err(_) => None,
        }
    }
}

/// Turns templates into shader source with a fixed module library.
#[derive(Debug, Clone, Default)]
pub struct ShaderGenerator {
    modules: ModuleLibrary,
}

impl ShaderGenerator {
    #[must_use]
    pub fn new(modules: ModuleLibrary) -> Self {
        Self { modules }
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleLibrary {
        &self.modules
    }

    pub fn generate(&self, template: &str, config: &GeneratorConfig) -> GenerationOutput {
        let mut diagnostics = Diagnostics::new();
        let Some(prepared) = self.prepare(template, config, &mut diagnostics) else {
            log::error!("Generation of '{}' aborted during preparation", config.shader_name);
            return GenerationOutput {
                source: None,
                diagnostics,
                header: TemplateHeader::default(),
            };
        };

        let source = prepared.render(&mut diagnostics);

        match &source {
            Some(text) => log::info!(
                "Generated '{}': {} lines, {} diagnostics",
                config.shader_name,
                text.lines().count(),
                diagnostics.len()
            ),
            None => log::error!("Generation of '{}' aborted", config.shader_name),
        }

        GenerationOutput {
            source,
            diagnostics,
            header: prepared.header,
        }
    }

    /// Steps 1 to 6. `None` after a fatal error, which is in `diagnostics`.
    pub fn prepare<'a>(
        &self,
        template: &str,
        config: &'a GeneratorConfig,
        diagnostics: &mut Diagnostics,
    ) -> Option<PreparedTemplate<'a>> {
        let reducer = TemplateReducer::new(&self.modules);
        let expanded = reducer.expand_modules(template, diagnostics);
        let header = TemplateHeader::scan(&expanded);

        let declarations = property_declarations(&expanded);
        let mut graph = PropertyGraph::from_declarations(
            declarations.iter().map(|l| (l.text.as_str(), l.line_number)),
            diagnostics,
        );
        // hooks are recognized by their declared implementation
        let hooks = hook_features(&graph, config);
        apply_overrides(&mut graph, config);

        let all: Vec<PropertyId> = graph.iter().map(|(id, _)| id).collect();
        let base = config
            .features
            .merged_with(&hooks)
            .merged_with(&FeatureSet::from_tokens(graph.needed_features(&all, &config.custom_properties)));

        let keyword_state = process_keywords(
            &expanded,
            &base,
            KeywordState::with_flags(config.flags.clone(), config.extra_flags.clone()),
            diagnostics,
        );
        let global = base.merged_with(&keyword_state.features);

        // usage as seen with every feature the template may need
        let mut scratch = Diagnostics::new();
        let first = reducer.reduce_lines(&expanded, &PassFeatures::uniform(global.clone()), &mut scratch);
        mark_usage(&mut graph, &first, diagnostics).ok()?;
        graph.link_declared_references(diagnostics);

        let passes = (0..pass_count(&first))
            .map(|pass| {
                let used = graph.used_properties(pass);
                let pass_base = config
                    .features
                    .merged_with(&hooks)
                    .merged_with(&FeatureSet::from_tokens(graph.needed_features(&used, &config.custom_properties)));
                let state = process_keywords(&expanded, &pass_base, KeywordState::default(), &mut scratch);
                pass_base.merged_with(&state.features)
            })
            .collect();
        let features = PassFeatures::new(global, passes);

        let lines = reducer.reduce_lines(&expanded, &features, diagnostics);
        graph.clear_pass_usage();
        mark_usage(&mut graph, &lines, diagnostics).ok()?;

        log::debug!(
            "Prepared '{}': {} properties, {} passes, {} lines",
            config.shader_name,
            graph.len(),
            features.passes.len(),
            lines.len()
        );

        let mut context = GenerationContext::new(config, graph);
        context.keywords = keywords(config, &keyword_state);
        context.features = features;

        Some(PreparedTemplate { context, lines, header })
    }
}

/// Replaces declared implementations with the configured ones.
fn apply_overrides(graph: &mut PropertyGraph, config: &GeneratorConfig) {
    for (name, implementations) in &config.implementations {
        match graph.id_of(name).and_then(|id| graph.get_mut(id)) {
            Some(property) => property.implementations.clone_from(implementations),
            None => log::warn!("Configured implementations for unknown property '{name}'"),
        }
    }
}

/// Features of overridden hook properties.
fn hook_features(graph: &PropertyGraph, config: &GeneratorConfig) -> FeatureSet {
    let mut features = FeatureSet::new();
    for name in config.implementations.keys() {
        if let Some(property) = graph.get_by_name(name)
            && property.is_hook()
        {
            features.extend(&property.toggle_features);
        }
    }
    features
}

fn mark_usage(graph: &mut PropertyGraph, lines: &[TemplateLine], diagnostics: &mut Diagnostics) -> Result<()> {
    for usage in value_usages(lines) {
        if let Err(err) = graph.mark_pass_usage(&usage.name, usage.pass) {
            diagnostics.push(err.clone(), usage.line_number);
            return Err(err);
        }
    }
    Ok(())
}

/// Configured keywords, then the keyword blocks', then flags and the shader name.
fn keywords(config: &GeneratorConfig, state: &KeywordState) -> BTreeMap<String, String> {
    let mut keywords = config.keywords.clone();
    keywords.extend(state.keywords.iter().map(|(k, v)| (k.clone(), v.clone())));
    keywords.extend(state.flag_keywords());
    keywords.insert("SHADER_NAME".to_string(), config.shader_name.clone());
    keywords
}
