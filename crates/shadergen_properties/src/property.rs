//! Shader properties and their declaration lines.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use shadergen_core::text::{split_excluding_blocks, to_lower_camel_case, KeyValues};
use shadergen_core::{Diagnostics, Result, ShaderGenError};

use crate::implementation::{CustomMaterialProperty, EmitEnv, Implementation, ImplementationKind, TextureSource};
use crate::types::{ProgramStage, ValueType};

/// Maximum number of passes tracked by [`Property::pass_usage`].
pub const MAX_PASSES: usize = 64;

bitflags! {
    /// Declaration options of a property.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PropertyFlags: u8 {
        /// Sampled by the template where it needs it, not with the other properties.
        const MANUALLY_SAMPLED = 1 << 0;
        /// Its implementations may not reference other properties.
        const CANT_REFERENCE   = 1 << 1;
        /// Computed in the lighting function, stored in the surface output.
        const LIGHTING         = 1 << 2;
    }
}

/// A named value exposed by the template and derived from its implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub label: String,
    pub help: Option<String>,
    pub value_type: ValueType,
    pub program: ProgramStage,
    pub flags: PropertyFlags,
    /// Reason why other properties can't reference this one.
    pub prevent_reference: Option<String>,
    /// Features enabled when a hook property is overridden.
    #[serde(default)]
    pub toggle_features: Vec<String>,
    /// Bit `n` set when pass `n` reads the property.
    pub pass_usage: u64,
    pub implementations: Vec<Implementation>,
    /// Line of the declaration in the template.
    #[serde(default)]
    pub line_number: usize,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, program: ProgramStage) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            help: None,
            value_type,
            program,
            flags: PropertyFlags::empty(),
            prevent_reference: None,
            toggle_features: Vec::new(),
            pass_usage: 0,
            implementations: Vec::new(),
            line_number: 0,
        }
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementations.push(implementation);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Parses a `#PROPERTIES_NEW` line:
    ///
    /// ```text
    /// color<TAB>Albedo<TAB>fragment, label = "Main Color", imp(color, default = (1,1,1,1))
    /// ```
    pub fn parse_declaration(line: &str, line_number: usize) -> Result<Self> {
        let invalid = || ShaderGenError::InvalidPropertyDeclaration(line.trim().to_string());

        let mut columns = line.trim().splitn(3, '\t').map(str::trim);
        let value_type = columns.next().and_then(ValueType::parse).ok_or_else(invalid)?;
        let name = columns.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        let rest = columns.next().ok_or_else(invalid)?;

        let parts = split_excluding_blocks(rest, ',', '(', ')');
        let (program, lighting) = parts
            .first()
            .and_then(|p| ProgramStage::parse(p))
            .ok_or_else(invalid)?;
        let program = if value_type.is_fixed_function() {
            ProgramStage::FixedFunction
        } else {
            program
        };

        let is_imp = |part: &str| part.starts_with("imp(");
        let options = KeyValues::parse(parts.iter().skip(1).map(String::as_str), is_imp);

        let mut flags = PropertyFlags::empty();
        flags.set(PropertyFlags::LIGHTING, lighting);
        flags.set(PropertyFlags::MANUALLY_SAMPLED, options.get_bool("manually_sampled", false));
        flags.set(PropertyFlags::CANT_REFERENCE, options.get_bool("cant_reference", false));

        let implementations = Implementation::parse_all(
            parts.iter().skip(1).map(String::as_str).filter(|p| is_imp(p)),
            name,
            value_type,
        )?;
        if implementations.is_empty() {
            return Err(ShaderGenError::InvalidPropertyDeclaration(format!(
                "'{name}' has no implementation"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            label: options.get_string("label", name),
            help: options.get("help").map(str::to_string),
            value_type,
            program,
            flags,
            prevent_reference: options.get("prevent_reference").map(str::to_string),
            toggle_features: options
                .get("toggles")
                .map(|t| t.split(',').map(str::trim).filter(|f| !f.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
            pass_usage: 0,
            implementations,
            line_number,
        })
    }

    /// Name of the sampled variable (`__albedo`), or the render state value
    /// for fixed function properties.
    #[must_use]
    pub fn variable_name(&self) -> String {
        if self.value_type.is_fixed_function() || self.program == ProgramStage::FixedFunction {
            return self
                .implementations
                .first()
                .map(Implementation::emit_fixed_function)
                .unwrap_or_default();
        }
        format!("__{}", to_lower_camel_case(&self.name))
    }

    #[inline]
    #[must_use]
    pub fn is_lighting(&self) -> bool {
        self.flags.contains(PropertyFlags::LIGHTING)
    }

    #[must_use]
    pub fn is_hook(&self) -> bool {
        self.implementations.iter().any(Implementation::is_hook)
    }

    #[must_use]
    pub fn is_fixed_function(&self) -> bool {
        self.program == ProgramStage::FixedFunction
    }

    /// Sampled by the template itself instead of the sampling block.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.flags.contains(PropertyFlags::MANUALLY_SAMPLED) || self.is_hook() || self.has_locked_uv()
    }

    fn has_locked_uv(&self) -> bool {
        self.implementations.iter().any(|imp| {
            matches!(
                imp.kind,
                ImplementationKind::MaterialTexture(TextureSource { locked_uv: true, .. })
            )
        })
    }

    /// Why this property can't be referenced, if it can't.
    #[must_use]
    pub fn reference_prevention(&self) -> Option<String> {
        if self.is_hook() {
            Some("(hook)".to_string())
        } else if self.has_locked_uv() {
            Some("(sampled elsewhere in code)".to_string())
        } else {
            self.prevent_reference.clone()
        }
    }

    #[must_use]
    pub fn is_used_in_pass(&self, pass: usize) -> bool {
        pass < MAX_PASSES && self.pass_usage & (1 << pass) != 0
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.pass_usage != 0
    }

    pub fn mark_used_in_pass(&mut self, pass: usize) {
        if pass < MAX_PASSES {
            self.pass_usage |= 1 << pass;
        } else {
            log::warn!("Pass {pass} of '{}' is beyond the {MAX_PASSES} tracked passes", self.name);
        }
    }

    #[must_use]
    pub fn needed_features(&self, custom: &[CustomMaterialProperty]) -> Vec<String> {
        let mut features: Vec<String> = self
            .implementations
            .iter()
            .flat_map(|imp| imp.needed_features(self.program, custom))
            .collect();
        features.dedup();
        features
    }

    /// Material property block lines, one implementation after the other.
    #[must_use]
    pub fn property_block(&self, indent: &str) -> Option<String> {
        join_lines(
            self.implementations.iter().filter_map(|imp| imp.property_block(&self.name, indent)),
            indent,
        )
    }

    #[must_use]
    pub fn declarations(&self, indent: &str) -> Option<String> {
        join_lines(self.implementations.iter().filter_map(|imp| imp.declare(indent)), indent)
    }

    #[must_use]
    pub fn declarations_outside_cbuffer(&self, indent: &str) -> Option<String> {
        join_lines(
            self.implementations.iter().filter_map(Implementation::declare_outside_cbuffer),
            indent,
        )
    }

    /// `UNITY_DEFINE_INSTANCED_PROP` lines of the instanced implementations.
    #[must_use]
    pub fn instanced_declarations(&self, indent: &str) -> Option<String> {
        join_lines(self.implementations.iter().filter_map(Implementation::declare_instanced), indent)
    }

    /// Field of the surface output struct carrying a lighting property.
    #[must_use]
    pub fn surface_output_declaration(&self) -> Option<String> {
        if !self.is_lighting() || self.is_deferred() {
            return None;
        }
        Some(format!("{} {};", self.value_type.shader_code(), self.variable_name()))
    }

    /// Statements that must precede the sampling line.
    pub fn prepend_statements(&self) -> impl Iterator<Item = &str> {
        self.implementations.iter().filter_map(Implementation::prepend_statement)
    }

    /// Left fold of the implementations in list order.
    ///
    /// Recoverable errors (missing coordinates) skip the implementation and
    /// are recorded; fatal ones are returned. A fold that produces nothing
    /// falls back to the zero of the value type.
    pub fn combined_expression(&self, env: &EmitEnv<'_>, diagnostics: &mut Diagnostics) -> Result<String> {
        let mut result = String::new();
        for (i, imp) in self.implementations.iter().enumerate() {
            if let Some(wrapped) = imp.wrap(&result, self.value_type) {
                result = wrapped;
                continue;
            }
            let value = match imp.emit(env) {
                Ok(value) => value,
                Err(err) if !err.is_fatal() => {
                    diagnostics.push(err, self.line_number);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if i > 0 && imp.has_operator() && !result.is_empty() {
                result.push_str(imp.operator.symbol());
            }
            result.push_str(&value);
        }
        if result.trim().is_empty() {
            log::warn!("Shader property '{}' sampled as zero: no usable implementation", self.name);
            diagnostics.push(ShaderGenError::EmptyExpression(self.name.clone()), self.line_number);
            result = self.value_type.zero_literal().to_owned();
        }
        Ok(result)
    }

    /// `float3 __albedo = ( ... );`, or an assignment to the surface output
    /// for lighting properties when the pass has a lighting function.
    pub fn sample_line(&self, env: &EmitEnv<'_>, diagnostics: &mut Diagnostics) -> Result<String> {
        let expression = self.combined_expression(env, diagnostics)?;
        Ok(if self.is_lighting() && env.pass_has_lighting {
            format!("{}.{} = ( {expression} );", env.output, self.variable_name())
        } else {
            format!("{} {} = ( {expression} );", self.value_type.shader_code(), self.variable_name())
        })
    }

    /// Inline sample for manually sampled properties: `( ... )`.
    pub fn inline_sample(&self, env: &EmitEnv<'_>, diagnostics: &mut Diagnostics) -> Result<String> {
        Ok(format!("( {} )", self.combined_expression(env, diagnostics)?))
    }

    /// How the template reads an already sampled value.
    #[must_use]
    pub fn read_name(&self, input: &str, pass_has_lighting: bool) -> String {
        if self.is_lighting() && pass_has_lighting {
            format!("{input}.{}", self.variable_name())
        } else {
            self.variable_name()
        }
    }
}

fn join_lines(lines: impl Iterator<Item = String>, indent: &str) -> Option<String> {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(&format!("\n{indent}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operator;

    #[test]
    fn test_parse_declaration() {
        let line = "color\tMain Color\tlighting, label = \"Albedo\", help = \"Base color\", imp(color, default = (1,1,1,1)), imp(vertex_color, op = +)";
        let property = Property::parse_declaration(line, 12).unwrap();

        assert_eq!(property.name, "Main Color");
        assert_eq!(property.label, "Albedo");
        assert_eq!(property.help.as_deref(), Some("Base color"));
        assert_eq!(property.value_type, ValueType::Color);
        assert_eq!(property.program, ProgramStage::Fragment);
        assert!(property.is_lighting());
        assert_eq!(property.implementations.len(), 2);
        assert_eq!(property.implementations[1].operator, Operator::Add);
        assert_eq!(property.variable_name(), "__mainColor");
        assert_eq!(property.line_number, 12);
        assert_eq!(property.surface_output_declaration().as_deref(), Some("float3 __mainColor;"));
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(Property::parse_declaration("half\tX\tfragment, imp(float)", 1).is_err());
        assert!(Property::parse_declaration("float\tX\tgeometry, imp(float)", 1).is_err());
        assert!(Property::parse_declaration("float\tX\tfragment", 1).is_err());
        assert!(Property::parse_declaration("float", 1).is_err());
    }

    #[test]
    fn test_fixed_function_variable() {
        let property =
            Property::parse_declaration("fixed_function_float\tCull\tfixed, imp(float, variable = _Cull)", 3).unwrap();
        assert_eq!(property.program, ProgramStage::FixedFunction);
        assert_eq!(property.variable_name(), "[_Cull]");
    }

    #[test]
    fn test_deferred_and_prevention() {
        let hook = Property::parse_declaration(
            "float3\tNormal\tfragment, toggles = \"HOOK_NORMAL, USE_NORMAL\", imp(hook, label = normal)",
            1,
        )
        .unwrap();
        assert!(hook.is_hook());
        assert_eq!(hook.toggle_features, vec!["HOOK_NORMAL", "USE_NORMAL"]);
        assert!(hook.is_deferred());
        assert_eq!(hook.reference_prevention().as_deref(), Some("(hook)"));

        let manual = Property::parse_declaration(
            "float\tRamp\tfragment, manually_sampled, prevent_reference = \"(ramp)\", imp(float)",
            1,
        )
        .unwrap();
        assert!(manual.is_deferred());
        assert!(!manual.is_hook());
        assert_eq!(manual.reference_prevention().as_deref(), Some("(ramp)"));
    }

    #[test]
    fn test_pass_usage() {
        let mut property = Property::new("A", ValueType::Float, ProgramStage::Fragment);
        assert!(!property.is_used());
        property.mark_used_in_pass(2);
        assert!(property.is_used_in_pass(2));
        assert!(!property.is_used_in_pass(0));
        property.mark_used_in_pass(200);
        assert_eq!(property.pass_usage, 0b100);
    }
}
