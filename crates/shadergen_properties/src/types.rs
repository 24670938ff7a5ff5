//! Value types, program stages and combining operators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of the value a property produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Float2,
    Float3,
    Float4,
    Color,
    ColorRgba,
    FixedFunctionFloat,
    FixedFunctionEnum,
}

impl ValueType {
    /// Parses the declaration keyword (`float3`, `color_rgba`...).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "float" => Self::Float,
            "float2" => Self::Float2,
            "float3" => Self::Float3,
            "float4" => Self::Float4,
            "color" => Self::Color,
            "color_rgba" => Self::ColorRgba,
            "fixed_function_float" => Self::FixedFunctionFloat,
            "fixed_function_enum" => Self::FixedFunctionEnum,
            _ => return None,
        })
    }

    /// Shader type used to declare a sampled value.
    #[must_use]
    pub fn shader_code(self) -> &'static str {
        match self {
            Self::Float | Self::FixedFunctionFloat | Self::FixedFunctionEnum => "float",
            Self::Float2 => "float2",
            Self::Float3 | Self::Color => "float3",
            Self::Float4 | Self::ColorRgba => "float4",
        }
    }

    #[must_use]
    pub fn channel_count(self) -> usize {
        match self {
            Self::Float | Self::FixedFunctionFloat | Self::FixedFunctionEnum => 1,
            Self::Float2 => 2,
            Self::Float3 | Self::Color => 3,
            Self::Float4 | Self::ColorRgba => 4,
        }
    }

    /// Zero of this type as a shader literal: `0`, `float3(0,0,0)`...
    #[must_use]
    pub fn zero_literal(self) -> &'static str {
        match self.channel_count() {
            1 => "0",
            2 => "float2(0,0)",
            3 => "float3(0,0,0)",
            _ => "float4(0,0,0,0)",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_fixed_function(self) -> bool {
        matches!(self, Self::FixedFunctionFloat | Self::FixedFunctionEnum)
    }

    #[inline]
    #[must_use]
    pub fn is_color(self) -> bool {
        matches!(self, Self::Color | Self::ColorRgba)
    }

    /// Swizzle selecting every channel of this type, in `xyzw` or `rgba` style.
    #[must_use]
    pub fn default_swizzle(self, color_style: bool) -> &'static str {
        let all = if color_style { "rgba" } else { "xyzw" };
        &all[..self.channel_count()]
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float => "float",
            Self::Float2 => "float2",
            Self::Float3 => "float3",
            Self::Float4 => "float4",
            Self::Color => "color",
            Self::ColorRgba => "color_rgba",
            Self::FixedFunctionFloat => "fixed_function_float",
            Self::FixedFunctionEnum => "fixed_function_enum",
        };
        f.write_str(s)
    }
}

/// Shader program a value is computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStage {
    #[default]
    Undefined,
    Vertex,
    Fragment,
    /// Resolved at the render state level, never sampled in code.
    FixedFunction,
}

impl ProgramStage {
    /// Parses a declaration program; the flag is `true` for the lighting sub-mode.
    #[must_use]
    pub fn parse(s: &str) -> Option<(Self, bool)> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vert" => (Self::Vertex, false),
            "fragment" | "frag" | "surface" => (Self::Fragment, false),
            "lighting" => (Self::Fragment, true),
            "fixed" | "fixedfunction" => (Self::FixedFunction, false),
            _ => return None,
        })
    }
}

impl fmt::Display for ProgramStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undefined => "undefined",
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::FixedFunction => "fixed function",
        };
        f.write_str(s)
    }
}

/// How an implementation combines with the ones before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Multiply,
    Divide,
    Add,
    Subtract,
}

impl Operator {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "*" | "multiply" | "mul" => Self::Multiply,
            "/" | "divide" | "div" => Self::Divide,
            "+" | "add" => Self::Add,
            "-" | "subtract" | "sub" => Self::Subtract,
            _ => return None,
        })
    }

    /// Operator text with surrounding spaces, as inserted between terms.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Multiply => " * ",
            Self::Divide => " / ",
            Self::Add => " + ",
            Self::Subtract => " - ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_codes() {
        assert_eq!(ValueType::parse("color"), Some(ValueType::Color));
        assert_eq!(ValueType::Color.shader_code(), "float3");
        assert_eq!(ValueType::ColorRgba.channel_count(), 4);
        assert_eq!(ValueType::Float2.default_swizzle(false), "xy");
        assert_eq!(ValueType::Color.default_swizzle(true), "rgb");
        assert!(ValueType::FixedFunctionEnum.is_fixed_function());
        assert_eq!(ValueType::parse("half"), None);
    }

    #[test]
    fn test_program_parse() {
        assert_eq!(ProgramStage::parse("frag"), Some((ProgramStage::Fragment, false)));
        assert_eq!(ProgramStage::parse("lighting"), Some((ProgramStage::Fragment, true)));
        assert_eq!(ProgramStage::parse("Vertex"), Some((ProgramStage::Vertex, false)));
        assert_eq!(ProgramStage::parse("geometry"), None);
    }

    #[test]
    fn test_operator_symbols() {
        assert_eq!(Operator::parse("+").map(Operator::symbol), Some(" + "));
        assert_eq!(Operator::default().symbol(), " * ");
    }
}
