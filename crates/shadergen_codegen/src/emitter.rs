//! Code emission over reduced template lines.
//!
//! [`CodeEmitter`] walks the lines once, tracking the current pass, program
//! stage and input/output struct names from the `#` marker lines, and
//! replaces every `[[TAG]]` with content built from the property graph and
//! the pass's packed interpolants.
//!
//! # Collapsible blocks
//!
//! ```text
//! 	#if_not_empty
//! 	[Header(Rim)]
//! 	#start_not_empty_block
//! 	[[PROP:Rim Color]]
//! 	#end_not_empty_block
//! 	#end_not_empty
//! ```
//!
//! The lines before `#start_not_empty_block` and after
//! `#end_not_empty_block` are only written when the content between them
//! is not blank. Blocks nest.

use rustc_hash::FxHashSet;
use shadergen_core::text::leading_whitespace;
use shadergen_core::{Diagnostics, Result, ShaderGenError};
use shadergen_properties::{CustomMaterialProperty, EmitEnv, Property, PropertyId, ProgramStage};
use shadergen_template::metadata::pass_count;
use shadergen_template::reducer::END_MARKER;
use shadergen_template::TemplateLine;

use crate::context::{GenerationContext, PassState};
use crate::tags::{find_tag, SampleOptions, Tag, VariableBlock};

/// `#` blocks that never reach the output.
const SKIPPED_BLOCKS: [&str; 4] = ["#FEATURES", "#PROPERTIES_NEW", "#KEYWORDS", "#INPUT_VARIABLES"];

const NO_INPUT: &str = "no_input";
const NO_OUTPUT: &str = "no_output";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Section {
    #[default]
    Before,
    Content,
    After,
}

#[derive(Debug, Default)]
struct CollapsibleBlock {
    before: String,
    content: String,
    after: String,
    section: Section,
}

impl CollapsibleBlock {
    fn buffer(&mut self) -> &mut String {
        match self.section {
            Section::Before => &mut self.before,
            Section::Content => &mut self.content,
            Section::After => &mut self.after,
        }
    }

    fn render(self) -> Option<String> {
        if self.content.trim().is_empty() {
            return None;
        }
        Some(self.before + &self.content + &self.after)
    }
}

/// Emits the final text of reduced template lines.
///
/// Emission has no side effect on the context: running it twice on the same
/// inputs gives the same text.
#[derive(Debug, Clone, Copy)]
pub struct CodeEmitter<'c, 'a> {
    context: &'c GenerationContext<'a>,
    lines: &'c [TemplateLine],
}

impl<'c, 'a> CodeEmitter<'c, 'a> {
    #[must_use]
    pub fn new(context: &'c GenerationContext<'a>, lines: &'c [TemplateLine]) -> Self {
        Self { context, lines }
    }

    /// Emits every line. Fatal errors are recorded in `diagnostics` and returned.
    pub fn emit(&self, diagnostics: &mut Diagnostics) -> Result<String> {
        let mut run = EmitRun::new(self.context, self.lines);
        run.run(diagnostics)?;
        Ok(run.output)
    }
}

/// Mutable state of one emission.
struct EmitRun<'c, 'a> {
    context: &'c GenerationContext<'a>,
    lines: &'c [TemplateLine],
    /// Properties used by at least one pass, declaration order.
    all_used: Vec<PropertyId>,
    output: String,
    blocks: Vec<CollapsibleBlock>,
    pass_index: Option<usize>,
    new_pass: bool,
    pass: Option<PassState>,
    stage: ProgramStage,
    in_lighting: bool,
    input: String,
    output_struct: String,
    printed: FxHashSet<PropertyId>,
    include_properties: FxHashSet<PropertyId>,
    include_custom: FxHashSet<String>,
}

impl<'c, 'a> EmitRun<'c, 'a> {
    fn new(context: &'c GenerationContext<'a>, lines: &'c [TemplateLine]) -> Self {
        let graph = &context.graph;
        let mut used: FxHashSet<PropertyId> = FxHashSet::default();
        for pass in 0..pass_count(lines) {
            used.extend(graph.used_properties(pass));
        }
        let all_used = graph.iter().map(|(id, _)| id).filter(|id| used.contains(id)).collect();

        Self {
            context,
            lines,
            all_used,
            output: String::new(),
            blocks: Vec::new(),
            pass_index: None,
            new_pass: false,
            pass: None,
            stage: ProgramStage::Undefined,
            in_lighting: false,
            input: NO_INPUT.to_string(),
            output_struct: NO_OUTPUT.to_string(),
            printed: FxHashSet::default(),
            include_properties: FxHashSet::default(),
            include_custom: FxHashSet::default(),
        }
    }

    fn run(&mut self, diagnostics: &mut Diagnostics) -> Result<()> {
        let lines = self.lines;
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            i += 1;
            let text = line.text.as_str();

            if text.starts_with('#') {
                if SKIPPED_BLOCKS.iter().any(|b| text.starts_with(b)) {
                    while i < lines.len() {
                        i += 1;
                        if lines[i - 1].text.trim() == END_MARKER {
                            break;
                        }
                    }
                    continue;
                }
                self.apply_markers(text);
                if text.contains("not_empty") {
                    log::warn!(
                        "line {}: collapsible marker must be indented, treated as a marker line",
                        line.line_number
                    );
                }
                continue;
            }

            match text.trim() {
                "#if_not_empty" => {
                    self.blocks.push(CollapsibleBlock::default());
                    continue;
                }
                "#start_not_empty_block" => {
                    self.switch_section(Section::Content, line, diagnostics);
                    continue;
                }
                "#end_not_empty_block" => {
                    self.switch_section(Section::After, line, diagnostics);
                    continue;
                }
                "#end_not_empty" => {
                    self.close_block(line, diagnostics);
                    continue;
                }
                _ => {}
            }

            if self.new_pass {
                self.new_pass = false;
                if let Some(pass) = self.pass_index {
                    self.pass = Some(PassState::build(self.context, lines, pass, diagnostics)?);
                }
            }

            if let Some(emitted) = self.process_line(line, diagnostics)? {
                let buffer = self.buffer();
                buffer.push_str(&emitted);
                buffer.push('\n');
            }
        }

        while let Some(block) = self.blocks.pop() {
            diagnostics.push_unlocated(ShaderGenError::UnbalancedBlock(
                "#if_not_empty without #end_not_empty".to_string(),
            ));
            if let Some(text) = block.render() {
                self.buffer().push_str(&text);
            }
        }
        Ok(())
    }

    /// `#VERTEX`, `#LIGHTING, INPUT=surface`, `#PASS`...
    fn apply_markers(&mut self, text: &str) {
        for tag in text[1..].split(',') {
            let tag: String = tag.chars().filter(|c| !c.is_whitespace()).collect();
            match tag.as_str() {
                "VERTEX" => {
                    self.stage = ProgramStage::Vertex;
                    self.in_lighting = false;
                }
                "FRAGMENT" | "SURFACE" => {
                    self.stage = ProgramStage::Fragment;
                    self.in_lighting = false;
                }
                "LIGHTING" => {
                    self.stage = ProgramStage::Fragment;
                    self.in_lighting = true;
                }
                "PASS" => {
                    self.new_pass = true;
                    self.pass_index = Some(self.pass_index.map_or(0, |p| p + 1));
                }
                other => {
                    if let Some(source) = other.strip_prefix("INPUT=") {
                        self.input = source.to_string();
                    } else if let Some(source) = other.strip_prefix("OUTPUT=") {
                        self.output_struct = source.to_string();
                    }
                }
            }
        }
    }

    fn buffer(&mut self) -> &mut String {
        match self.blocks.last_mut() {
            Some(block) => block.buffer(),
            None => &mut self.output,
        }
    }

    fn switch_section(&mut self, section: Section, line: &TemplateLine, diagnostics: &mut Diagnostics) {
        match self.blocks.last_mut() {
            Some(block) => block.section = section,
            None => diagnostics.push(
                ShaderGenError::UnbalancedBlock(format!("'{}' outside of #if_not_empty", line.text.trim())),
                line.line_number,
            ),
        }
    }

    fn close_block(&mut self, line: &TemplateLine, diagnostics: &mut Diagnostics) {
        let Some(block) = self.blocks.pop() else {
            diagnostics.push(
                ShaderGenError::UnbalancedBlock("#end_not_empty without #if_not_empty".to_string()),
                line.line_number,
            );
            return;
        };
        if let Some(text) = block.render() {
            self.buffer().push_str(&text);
        }
    }

    /// Tag and keyword replacement of a regular line; `None` when it ends up blank.
    fn process_line(&mut self, line: &TemplateLine, diagnostics: &mut Diagnostics) -> Result<Option<String>> {
        let raw = line.text.as_str();
        if raw.is_empty() {
            return Ok(Some(String::new()));
        }

        let indent = leading_whitespace(raw).to_string();
        let trimmed = raw.trim_start();
        let is_comment = trimmed.starts_with("//") && !trimmed.starts_with("///");

        let mut text = self.context.replace_keywords(raw);
        if is_comment {
            return Ok(Some(text));
        }

        let mut skip = false;
        let mut cursor = 0;
        loop {
            let (start, end, tag) = match find_tag(&text[cursor..]) {
                Ok(Some((start, end, tag))) => (cursor + start, cursor + end, tag.to_string()),
                Ok(None) => break,
                Err(()) => {
                    diagnostics.push(ShaderGenError::UnclosedTag(text.trim().to_string()), line.line_number);
                    break;
                }
            };

            let replacement = self.resolve(&Tag::parse(&tag), &indent, line, diagnostics)?;
            let tail = text.len() - end;
            let replaced = format!("{}{replacement}{}", &text[..start], &text[end..]);
            text = format!("{indent}{}", replaced.trim_start());
            skip = text.trim().is_empty();

            // resume after the replacement
            cursor = text.len().saturating_sub(tail);
            while !text.is_char_boundary(cursor) {
                cursor -= 1;
            }
        }

        Ok((!skip).then_some(text))
    }

    fn resolve(
        &mut self,
        tag: &Tag,
        indent: &str,
        line: &TemplateLine,
        diagnostics: &mut Diagnostics,
    ) -> Result<String> {
        match tag {
            Tag::Value(name) => {
                let property = self.property(name, line, diagnostics)?;
                Ok(property.read_name(&self.input, self.pass_has_lighting()))
            }
            Tag::Prop(name) => {
                let property = self.property(name, line, diagnostics)?;
                let block = property.property_block(indent).unwrap_or_default();
                if let Some(id) = self.context.graph.id_of(name) {
                    self.printed.insert(id);
                }
                Ok(block)
            }
            Tag::Properties => Ok(self.properties(indent)),
            Tag::SurfaceOutput => Ok(self.surface_output(indent)),
            Tag::Variables { block, include } => Ok(match block {
                VariableBlock::Buffer => self.variables(indent, *include),
                VariableBlock::OutsideBuffer => self.variables_outside_buffer(indent, *include),
                VariableBlock::Instancing => self.variables_instanced(indent, *include),
            }),
            Tag::InputStructSemantics(first) => Ok(self
                .pass
                .as_ref()
                .and_then(|p| p.interpolants.declarations(*first, indent))
                .unwrap_or_default()),
            Tag::InputValue(name) => Ok(self
                .pass
                .as_ref()
                .and_then(|p| p.interpolants.get(name))
                .unwrap_or(name)
                .to_string()),
            Tag::SampleProperty { name, inline, options } => {
                self.sample_property(name, *inline, options, indent, line, diagnostics)
            }
            Tag::SampleProperties => self.sample_properties(indent, line, diagnostics),
            Tag::InputStruct => Ok(self.input_struct(indent)),
            Tag::GpuInstancingOptions => Ok(self.gpu_instancing_options()),
            Tag::SurfaceFlags => Ok(String::new()),
            Tag::Unknown(tag) => {
                diagnostics.push(ShaderGenError::UnknownTag(tag.clone()), line.line_number);
                Ok(format!("/* UNKNOWN_TAG:{tag} */"))
            }
        }
    }

    fn property(&self, name: &str, line: &TemplateLine, diagnostics: &mut Diagnostics) -> Result<&'c Property> {
        let context: &'c GenerationContext<'a> = self.context;
        context.graph.get_by_name(name).ok_or_else(|| {
            let err = ShaderGenError::UnknownProperty(name.to_string());
            diagnostics.push(err.clone(), line.line_number);
            err
        })
    }

    fn pass_has_lighting(&self) -> bool {
        self.pass.as_ref().is_some_and(|p| p.has_lighting)
    }

    fn pass_used(&self) -> &[PropertyId] {
        self.pass.as_ref().map_or(&[], |p| p.used.as_slice())
    }

    fn env<'e>(&'e self, input: &'e str, options: Option<&'e SampleOptions>) -> EmitEnv<'e> {
        EmitEnv {
            stage: self.stage,
            input,
            output: &self.output_struct,
            pass_has_lighting: self.pass_has_lighting(),
            graph: &self.context.graph,
            custom_properties: &self.context.config.custom_properties,
            interpolants: self.pass.as_ref().map(|p| &p.interpolants),
            uv_override: options.and_then(|o| o.uv.as_deref()),
            hide_channels: options.is_some_and(|o| o.hide_channels),
        }
    }

    fn properties(&self, indent: &str) -> String {
        let graph = &self.context.graph;
        let mut replacement = String::new();
        for &id in &self.all_used {
            if self.printed.contains(&id) {
                continue;
            }
            if let Some(block) = graph.get(id).and_then(|p| p.property_block(indent)) {
                replacement.push_str(&format!("{block}\n{indent}"));
            }
        }
        if !replacement.is_empty() {
            replacement = format!("\n{indent}{replacement}");
        }

        let custom: String = self
            .context
            .custom_properties_of(&self.all_used)
            .iter()
            .filter_map(|c| c.implementation.property_block(&c.name, indent))
            .map(|block| format!("{block}\n{indent}"))
            .collect();
        if !custom.is_empty() {
            if replacement.is_empty() {
                replacement = format!("// Custom Material Properties\n{indent}{custom}");
            } else {
                replacement.push_str(&format!("\n{indent}// Custom Material Properties\n{indent}{custom}"));
            }
        }
        replacement.trim_end().to_string()
    }

    fn surface_output(&self, indent: &str) -> String {
        let lines: String = self
            .pass_used()
            .iter()
            .filter_map(|&id| self.context.graph.get(id))
            .filter_map(Property::surface_output_declaration)
            .map(|declaration| format!("{indent}{declaration}\n"))
            .collect();
        if lines.is_empty() {
            return String::new();
        }
        format!("\n{indent}// Shader Properties\n{lines}").trim_end().to_string()
    }

    /// Custom material properties of the whole template (`include`) or of the pass.
    fn custom_properties(&self, include: bool) -> Vec<&'a CustomMaterialProperty> {
        if include {
            self.context.custom_properties_of(&self.all_used)
        } else {
            self.context.custom_properties_of(self.pass_used())
        }
    }

    fn scoped_properties(&self, include: bool) -> Vec<PropertyId> {
        if include {
            self.all_used.clone()
        } else {
            self.pass_used().to_vec()
        }
    }

    fn variables(&mut self, indent: &str, include: bool) -> String {
        let mut custom = String::new();
        for c in self.custom_properties(include) {
            if c.implementation.is_instanced() || self.include_custom.contains(&c.name) {
                continue;
            }
            if let Some(declaration) = c.implementation.declare(indent) {
                custom.push_str(&format!("{indent}{declaration}\n"));
            }
            if include {
                self.include_custom.insert(c.name.clone());
            }
        }

        let mut declarations = String::new();
        for id in self.scoped_properties(include) {
            if self.include_properties.contains(&id) {
                continue;
            }
            let Some(declaration) = self.context.graph.get(id).and_then(|p| p.declarations(indent)) else {
                continue;
            };
            declarations.push_str(&format!("{indent}{declaration}\n"));
            if include {
                self.include_properties.insert(id);
            }
        }

        sectioned(indent, &custom, &declarations)
    }

    fn variables_outside_buffer(&self, indent: &str, include: bool) -> String {
        let custom: String = self
            .custom_properties(include)
            .iter()
            .filter_map(|c| c.implementation.declare_outside_cbuffer())
            .map(|declaration| format!("{indent}{declaration}\n"))
            .collect();
        let declarations: String = self
            .scoped_properties(include)
            .into_iter()
            .filter_map(|id| self.context.graph.get(id))
            .filter_map(|p| p.declarations_outside_cbuffer(indent))
            .map(|declaration| format!("{indent}{declaration}\n"))
            .collect();
        sectioned(indent, &custom, &declarations)
    }

    fn variables_instanced(&mut self, indent: &str, include: bool) -> String {
        let inner = format!("{indent}\t");

        let mut custom = String::new();
        for c in self.custom_properties(include) {
            if !c.implementation.is_instanced() || self.include_custom.contains(&c.name) {
                continue;
            }
            if let Some(declaration) = c.implementation.declare_instanced() {
                custom.push_str(&format!("{inner}{declaration}\n"));
            }
            if include {
                self.include_custom.insert(c.name.clone());
            }
        }

        let mut declarations = String::new();
        for id in self.scoped_properties(include) {
            if self.include_properties.contains(&id) {
                continue;
            }
            let Some(declaration) = self.context.graph.get(id).and_then(|p| p.instanced_declarations(&inner)) else {
                continue;
            };
            declarations.push_str(&format!("{inner}{declaration}\n"));
            if include {
                self.include_properties.insert(id);
            }
        }

        let mut content = String::new();
        if !custom.is_empty() {
            content.push_str(&format!("{inner}// Custom Material Properties\n{custom}"));
        }
        if !declarations.is_empty() {
            content.push_str(&format!("{inner}// Shader Properties\n{declarations}"));
        }
        let content = content.trim_end();
        if content.is_empty() {
            return String::new();
        }

        format!(
            "\n{indent}// Instancing support for this shader. You need to check 'Enable Instancing' on materials that use the shader.\n\
             {indent}// See https://docs.unity3d.com/Manual/GPUInstancing.html for more information about instancing.\n\
             {indent}UNITY_INSTANCING_BUFFER_START(Props)\n\
             {content}\n\
             {indent}UNITY_INSTANCING_BUFFER_END(Props)"
        )
    }

    fn sample_property(
        &self,
        name: &str,
        inline: bool,
        options: &SampleOptions,
        indent: &str,
        line: &TemplateLine,
        diagnostics: &mut Diagnostics,
    ) -> Result<String> {
        let property = self.property(name, line, diagnostics)?;
        if property.program != self.stage {
            return Ok(String::new());
        }

        // the lighting function receives the surface input wrapped in its own struct
        let input = if self.stage == ProgramStage::Fragment && self.in_lighting {
            format!("{}.input", self.input)
        } else {
            self.input.clone()
        };
        let env = self.env(&input, Some(options));

        let sampled = if inline {
            property.inline_sample(&env, diagnostics)
        } else {
            property.sample_line(&env, diagnostics).map(|sample| {
                let mut lines: Vec<String> = property.prepend_statements().map(str::to_string).collect();
                lines.push(sample);
                format!("{indent}{}", lines.join(&format!("\n{indent}")))
            })
        };
        sampled.inspect_err(|err| diagnostics.push(err.clone(), line.line_number))
    }

    fn sample_properties(&self, indent: &str, line: &TemplateLine, diagnostics: &mut Diagnostics) -> Result<String> {
        let Some(pass) = &self.pass else {
            return Ok(String::new());
        };
        let env = self.env(&self.input, None);

        let mut replacement = String::new();
        for property in pass.order.iter().filter_map(|&id| self.context.graph.get(id)) {
            if property.is_deferred() || property.is_fixed_function() || property.program != self.stage {
                continue;
            }
            for statement in property.prepend_statements() {
                replacement.push_str(&format!("{indent}{statement}\n"));
            }
            let sample = property
                .sample_line(&env, diagnostics)
                .inspect_err(|err| diagnostics.push(err.clone(), line.line_number))?;
            replacement.push_str(&format!("{indent}{sample}\n"));
        }

        if replacement.is_empty() {
            return Ok(replacement);
        }
        Ok(format!("{indent}// Shader Properties Sampling\n{}", replacement.trim_end()))
    }

    fn input_struct(&self, indent: &str) -> String {
        let Some(pass) = &self.pass else {
            return String::new();
        };
        pass.texcoords
            .iter()
            .map(|v| format!("{indent}{} {};", v.type_name(), v.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn gpu_instancing_options(&self) -> String {
        let Some(options) = self.context.keywords.get("FLAGS:pragma_gpu_instancing") else {
            return String::new();
        };
        let mut line = format!("#pragma instancing_options {options}");
        if line.contains("maxcount")
            && let Some(count) = self.context.keywords.get("GPU_INSTANCING_MAX_COUNT_VALUE")
        {
            line = line.replace("maxcount", &format!("maxcount:{count}"));
        }
        line
    }
}

/// `// Custom Material Properties` and `// Shader Properties` sections, each
/// only when it has lines.
fn sectioned(indent: &str, custom: &str, declarations: &str) -> String {
    let mut replacement = String::new();
    if !custom.is_empty() {
        replacement.push_str(&format!("\n{indent}// Custom Material Properties\n{custom}"));
    }
    if !declarations.is_empty() {
        replacement.push_str(&format!("\n{indent}// Shader Properties\n{declarations}"));
    }
    replacement.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use shadergen_properties::{Implementation, ImplementationKind, PropertyGraph, ValueType};

    fn lines(text: &str) -> Vec<TemplateLine> {
        text.lines()
            .enumerate()
            .map(|(i, l)| TemplateLine::new(l, i + 1))
            .collect()
    }

    fn float_property(name: &str, variable: &str) -> Property {
        Property::new(name, ValueType::Float, ProgramStage::Fragment).with_implementation(Implementation::new(
            ImplementationKind::MaterialFloat {
                variable: variable.to_string(),
                label: name.to_string(),
                default: 1.0,
                drawer: String::new(),
            },
        ))
    }

    fn graph() -> PropertyGraph {
        let mut graph = PropertyGraph::new();
        graph.insert(float_property("Rim Min", "_RimMin")).unwrap();
        graph.insert(float_property("Rim Max", "_RimMax")).unwrap();
        graph.mark_pass_usage("Rim Min", 0).unwrap();
        graph
    }

    fn emit(template: &str, graph: PropertyGraph) -> (Result<String>, Diagnostics) {
        let config = GeneratorConfig::new("Test");
        let context = GenerationContext::new(&config, graph);
        let lines = lines(template);
        let mut diagnostics = Diagnostics::new();
        let result = CodeEmitter::new(&context, &lines).emit(&mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn test_value_and_keywords() {
        let (result, diagnostics) = emit("Shader \"@%SHADER_NAME%@\"\n#PASS\n\tfloat x = [[VALUE:Rim Min]];", graph());
        assert!(diagnostics.is_empty());
        assert_eq!(result.unwrap(), "Shader \"Test\"\n\tfloat x = __rimMin;\n");
    }

    #[test]
    fn test_blank_after_replacement_is_dropped() {
        let (result, _) = emit("#PASS\n\t[[SURFACE_FLAGS]]\nend", graph());
        assert_eq!(result.unwrap(), "end\n");
    }

    #[test]
    fn test_collapsible_block() {
        let template = "\
#PASS
\t#if_not_empty
\t[Header(Rim)]
\t#start_not_empty_block
\t[[PROP:Rim Min]]
\t#end_not_empty_block
\t#end_not_empty
\t#if_not_empty
\t[Header(Empty)]
\t#start_not_empty_block
\t[[SURFACE_FLAGS]]
\t#end_not_empty_block
\t#end_not_empty";
        let (result, _) = emit(template, graph());
        let output = result.unwrap();
        assert!(output.contains("[Header(Rim)]"));
        assert!(output.contains("_RimMin (\"Rim Min\", Float)"));
        assert!(!output.contains("Empty"));
    }

    #[test]
    fn test_properties_skips_printed_and_unused() {
        let template = "#PASS\n\t[[PROP:Rim Min]]\n\t[[PROPERTIES]]";
        let (result, _) = emit(template, graph());
        let output = result.unwrap();
        assert_eq!(output.matches("_RimMin").count(), 1);
        assert!(!output.contains("_RimMax"));
    }

    #[test]
    fn test_variables_and_sampling() {
        let template = "\
#PASS
\t[[VARIABLES]]
#FRAGMENT, INPUT=input, OUTPUT=output
\t[[SAMPLE_SHADER_PROPERTIES]]";
        let (result, _) = emit(template, graph());
        assert_eq!(
            result.unwrap(),
            "\t// Shader Properties\n\tfloat _RimMin;\n\t// Shader Properties Sampling\n\tfloat __rimMin = ( _RimMin );\n"
        );
    }

    #[test]
    fn test_sampling_respects_stage() {
        let template = "#PASS\n#VERTEX\n\t[[SAMPLE_SHADER_PROPERTIES]]\n\t[[SAMPLE_SHADER_PROPERTY:Rim Min]]\nend";
        let (result, _) = emit(template, graph());
        assert_eq!(result.unwrap(), "end\n");
    }

    #[test]
    fn test_unknown_tag_is_not_fatal() {
        let (result, diagnostics) = emit("#PASS\n\tx = [[NOPE]];", graph());
        assert_eq!(result.unwrap(), "\tx = /* UNKNOWN_TAG:NOPE */;\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_fatal());
    }

    #[test]
    fn test_unknown_property_is_fatal() {
        let (result, diagnostics) = emit("#PASS\n\tx = [[VALUE:Missing]];", graph());
        assert!(matches!(result, Err(ShaderGenError::UnknownProperty(_))));
        assert!(diagnostics.has_fatal());
    }

    #[test]
    fn test_comments_keep_tags() {
        let (result, _) = emit("#PASS\n\t// [[VALUE:Missing]]", graph());
        assert_eq!(result.unwrap(), "\t// [[VALUE:Missing]]\n");
    }

    #[test]
    fn test_skipped_blocks_and_unbalanced_markers() {
        let template = "#PASS\n#INPUT_VARIABLES\nfloat3 worldPos\n#END\n\t#end_not_empty\nbody";
        let (result, diagnostics) = emit(template, graph());
        assert_eq!(result.unwrap(), "body\n");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_emit_is_repeatable() {
        let config = GeneratorConfig::new("Test");
        let context = GenerationContext::new(&config, graph());
        let lines = lines("#PASS\n\t[[PROPERTIES]]\n\t[[VARIABLES]]");
        let emitter = CodeEmitter::new(&context, &lines);
        let mut diagnostics = Diagnostics::new();
        let first = emitter.emit(&mut diagnostics).unwrap();
        let second = emitter.emit(&mut diagnostics).unwrap();
        assert_eq!(first, second);
    }
}
