//! Generation context and per-pass state.
//!
//! A [`GenerationContext`] is built once per request and owns everything
//! the emitter reads: the property graph with its pass usage, the keyword
//! table and the feature sets. Nothing here outlives the request.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use shadergen_core::{Diagnostics, Result};
use shadergen_properties::{
    CustomMaterialProperty, ImplementationKind, InterpolantPacker, NamedVariable, PackedInterpolants, PropertyGraph,
    PropertyId, ProgramStage,
};
use shadergen_template::metadata::{input_variables, is_surface_pass};
use shadergen_template::{PassFeatures, TemplateLine};

use crate::config::GeneratorConfig;

/// Read-only inputs of the emitter for one generation.
#[derive(Debug)]
pub struct GenerationContext<'a> {
    pub config: &'a GeneratorConfig,
    pub graph: PropertyGraph,
    /// `@%KEY%@` values: configuration, keyword blocks, flags, shader name.
    pub keywords: BTreeMap<String, String>,
    pub features: PassFeatures,
}

impl<'a> GenerationContext<'a> {
    #[must_use]
    pub fn new(config: &'a GeneratorConfig, graph: PropertyGraph) -> Self {
        let mut keywords = config.keywords.clone();
        keywords.insert("SHADER_NAME".to_string(), config.shader_name.clone());
        Self {
            config,
            graph,
            keywords,
            features: PassFeatures::uniform(config.features.clone()),
        }
    }

    /// Replaces every `@%KEY%@` with its value. Unknown keys are left as is.
    #[must_use]
    pub fn replace_keywords(&self, line: &str) -> String {
        if !line.contains("@%") {
            return line.to_string();
        }
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(start) = rest.find("@%") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("%@") else { break };
            let key = &after[..end];
            out.push_str(&rest[..start]);
            match self.keywords.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    log::trace!("No value for keyword '{key}'");
                    out.push_str(&rest[start..start + end + 4]);
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Custom material properties read by `ids`, in configuration order.
    #[must_use]
    pub fn custom_properties_of(&self, ids: &[PropertyId]) -> Vec<&'a CustomMaterialProperty> {
        let config = self.config;
        let names: Vec<&str> = ids
            .iter()
            .filter_map(|&id| self.graph.get(id))
            .flat_map(|p| p.implementations.iter())
            .filter_map(|imp| match &imp.kind {
                ImplementationKind::CustomMaterialProperty { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        config
            .custom_properties
            .iter()
            .filter(|c| names.contains(&c.name.as_str()))
            .collect()
    }
}

/// State recomputed at the start of every pass.
#[derive(Debug, Clone, Default)]
pub struct PassState {
    pub index: usize,
    /// Used properties, declaration order.
    pub used: Vec<PropertyId>,
    /// Used properties, dependencies first.
    pub order: Vec<PropertyId>,
    /// Texture coordinates read by the fragment stage.
    pub texcoords: Vec<NamedVariable>,
    pub interpolants: PackedInterpolants,
    /// The pass declares a surface function, lighting properties live in its output struct.
    pub has_lighting: bool,
}

impl PassState {
    /// Usage closure, sampling order and interpolant packing of `pass`.
    ///
    /// Fails on a sampling order cycle.
    pub fn build(
        context: &GenerationContext<'_>,
        lines: &[TemplateLine],
        pass: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let graph = &context.graph;
        let used = graph.used_properties(pass);
        let order = graph.sampling_order(&used).inspect_err(|err| {
            diagnostics.push_unlocated(err.clone());
        })?;

        let texcoords = texcoord_variables(graph, &used, &context.config.custom_properties);
        let mut variables = texcoords.clone();
        let input = input_variables(lines, pass);
        if let Some(input) = &input {
            variables.extend(input.iter().filter_map(|line| NamedVariable::parse(line)));
        }
        let interpolants = match input {
            Some(_) => InterpolantPacker::new(context.config.swizzle_style).pack(&variables),
            None => PackedInterpolants::identity(&variables),
        };

        log::debug!(
            "Pass {pass}: {} used properties, {} interpolant registers",
            used.len(),
            interpolants.register_count()
        );

        Ok(Self {
            index: pass,
            used,
            order,
            texcoords,
            interpolants,
            has_lighting: is_surface_pass(lines, pass),
        })
    }
}

/// `float{n} texcoord{c}` for every channel read by fragment properties,
/// directly or through a custom material property; widest use per channel,
/// sorted by channel.
fn texcoord_variables(
    graph: &PropertyGraph,
    used: &[PropertyId],
    custom: &[CustomMaterialProperty],
) -> Vec<NamedVariable> {
    let mut channels: FxHashMap<u32, usize> = FxHashMap::default();
    for property in used.iter().filter_map(|&id| graph.get(id)) {
        if property.program != ProgramStage::Fragment {
            continue;
        }
        let usages = property.implementations.iter().filter_map(|imp| match &imp.kind {
            ImplementationKind::CustomMaterialProperty { name, .. } => custom
                .iter()
                .find(|c| &c.name == name)
                .and_then(|c| c.implementation.texcoord_usage()),
            _ => imp.texcoord_usage(),
        });
        for (channel, width) in usages {
            let entry = channels.entry(channel).or_insert(width);
            *entry = (*entry).max(width);
        }
    }
    let mut channels: Vec<(u32, usize)> = channels.into_iter().collect();
    channels.sort_unstable();
    channels
        .into_iter()
        .map(|(channel, width)| NamedVariable::new(format!("texcoord{channel}"), width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadergen_properties::{Implementation, Property, ValueType};

    fn graph() -> PropertyGraph {
        let mut graph = PropertyGraph::new();
        graph
            .insert(
                Property::new("Albedo", ValueType::Color, ProgramStage::Fragment).with_implementation(
                    Implementation::new(ImplementationKind::VertexTexcoord {
                        channel: 1,
                        swizzle: "xyz".into(),
                    }),
                ),
            )
            .unwrap();
        graph
            .insert(
                Property::new("Mask", ValueType::Float, ProgramStage::Fragment).with_implementation(
                    Implementation::new(ImplementationKind::VertexTexcoord {
                        channel: 0,
                        swizzle: "x".into(),
                    }),
                ),
            )
            .unwrap();
        graph.mark_pass_usage("Albedo", 0).unwrap();
        graph.mark_pass_usage("Mask", 0).unwrap();
        graph
    }

    #[test]
    fn test_keyword_replacement() {
        let config = GeneratorConfig::new("My Shader").with_keyword("RIM", "Rim");
        let context = GenerationContext::new(&config, PropertyGraph::new());
        assert_eq!(
            context.replace_keywords("Shader \"@%SHADER_NAME%@\" // @%RIM%@ @%MISSING%@"),
            "Shader \"My Shader\" // Rim @%MISSING%@"
        );
        assert_eq!(context.replace_keywords("broken @%KEY"), "broken @%KEY");
    }

    #[test]
    fn test_texcoords_sorted_by_channel() {
        let graph = graph();
        let used = graph.used_properties(0);
        let variables = texcoord_variables(&graph, &used, &[]);
        let names: Vec<(&str, usize)> = variables.iter().map(|v| (v.name.as_str(), v.width)).collect();
        assert_eq!(names, vec![("texcoord0", 2), ("texcoord1", 3)]);
    }

    #[test]
    fn test_pass_state_packs_declared_inputs() {
        let config = GeneratorConfig::default();
        let context = GenerationContext::new(&config, graph());
        let lines: Vec<TemplateLine> = ["#PASS", "#INPUT_VARIABLES", "float2 screenUv", "#END"]
            .iter()
            .enumerate()
            .map(|(i, l)| TemplateLine::new(*l, i + 1))
            .collect();

        let mut diagnostics = Diagnostics::new();
        let state = PassState::build(&context, &lines, 0, &mut diagnostics).unwrap();
        assert!(state.interpolants.is_packed());
        assert_eq!(state.interpolants.get("texcoord1"), Some("pack0.xyz"));
        assert_eq!(state.interpolants.get("texcoord0"), Some("pack1.xy"));
        assert_eq!(state.interpolants.get("screenUv"), Some("pack1.zw"));
        assert!(!state.has_lighting);
        assert_eq!(state.used.len(), 2);
    }
}
