//! `[[TAG]]` parsing.
//!
//! Tags are recognized by prefix; everything after the `:` is the
//! argument, optionally followed by `(key = value, ...)` options.

use shadergen_core::text::{split_call, split_excluding_blocks, KeyValues};

/// Options of the sampling tags: `[[SAMPLE_VALUE_SHADER_PROPERTY:Albedo(uv = input.uv, hide_channels)]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleOptions {
    pub uv: Option<String>,
    pub hide_channels: bool,
}

impl SampleOptions {
    fn parse(arguments: Option<&str>) -> Self {
        let Some(arguments) = arguments else {
            return Self::default();
        };
        let parts = split_excluding_blocks(arguments, ',', '(', ')');
        let options = KeyValues::parse(parts.iter().map(String::as_str), |_| false);
        Self {
            uv: options.get("uv").map(str::to_string),
            hide_channels: options.get_bool("hide_channels", false),
        }
    }
}

/// Where a `VARIABLES*` tag puts its declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableBlock {
    /// Inside the constant buffer.
    Buffer,
    /// Texture samplers.
    OutsideBuffer,
    /// `UNITY_DEFINE_INSTANCED_PROP` lines.
    Instancing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// `VALUE:name`: reads an already sampled property.
    Value(String),
    /// `PROP:name`: material property block lines of one property.
    Prop(String),
    /// `PROPERTIES`: property block lines of every used property not printed yet.
    Properties,
    /// `VARIABLES_SURFACE_OUTPUT`
    SurfaceOutput,
    /// `VARIABLES*`; `include` covers every pass.
    Variables { block: VariableBlock, include: bool },
    /// `INPUT_STRUCT_SEMANTICS:n`
    InputStructSemantics(usize),
    /// `INPUT_VALUE:name`
    InputValue(String),
    /// `SAMPLE_SHADER_PROPERTY:name`, or `SAMPLE_VALUE_SHADER_PROPERTY:name` when `inline`.
    SampleProperty {
        name: String,
        inline: bool,
        options: SampleOptions,
    },
    /// `SAMPLE_SHADER_PROPERTIES`
    SampleProperties,
    /// `INPUT_STRUCT`: texture coordinate fields of a surface `Input` struct.
    InputStruct,
    /// `GPU_INSTANCING_OPTIONS`
    GpuInstancingOptions,
    /// `SURFACE_FLAGS`: consumed by the surrounding tooling, prints nothing.
    SurfaceFlags,
    Unknown(String),
}

impl Tag {
    /// Parses the text between `[[` and `]]`.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();

        if let Some(rest) = tag.strip_prefix("VALUE:") {
            return Self::Value(name_only(rest));
        }
        if let Some(rest) = tag.strip_prefix("PROP:") {
            return Self::Prop(name_only(rest));
        }
        if let Some(rest) = tag.strip_prefix("INPUT_STRUCT_SEMANTICS:") {
            return match rest.trim().parse::<usize>() {
                Ok(first) => Self::InputStructSemantics(first),
                Err(_) => Self::Unknown(tag.to_string()),
            };
        }
        if let Some(rest) = tag.strip_prefix("INPUT_VALUE:") {
            return Self::InputValue(rest.trim().to_string());
        }
        if let Some((rest, inline)) = tag
            .strip_prefix("SAMPLE_VALUE_SHADER_PROPERTY:")
            .map(|r| (r, true))
            .or_else(|| tag.strip_prefix("SAMPLE_SHADER_PROPERTY:").map(|r| (r, false)))
        {
            let (name, arguments) = split_call(rest.trim());
            return Self::SampleProperty {
                name: name.trim().to_string(),
                inline,
                options: SampleOptions::parse(arguments),
            };
        }

        match tag {
            "PROPERTIES" => Self::Properties,
            "VARIABLES_SURFACE_OUTPUT" => Self::SurfaceOutput,
            "VARIABLES" => Self::variables(VariableBlock::Buffer, false),
            "VARIABLES_INCLUDE" => Self::variables(VariableBlock::Buffer, true),
            "VARIABLES_OUTSIDE_CBUFFER" => Self::variables(VariableBlock::OutsideBuffer, false),
            "VARIABLES_OUTSIDE_CBUFFER_INCLUDE" => Self::variables(VariableBlock::OutsideBuffer, true),
            "VARIABLES_GPU_INSTANCING" => Self::variables(VariableBlock::Instancing, false),
            "VARIABLES_GPU_INSTANCING_INCLUDE" => Self::variables(VariableBlock::Instancing, true),
            "SAMPLE_SHADER_PROPERTIES" => Self::SampleProperties,
            "INPUT_STRUCT" => Self::InputStruct,
            "GPU_INSTANCING_OPTIONS" => Self::GpuInstancingOptions,
            "SURFACE_FLAGS" => Self::SurfaceFlags,
            _ => Self::Unknown(tag.to_string()),
        }
    }

    fn variables(block: VariableBlock, include: bool) -> Self {
        Self::Variables { block, include }
    }
}

/// `Albedo(...)` -> `Albedo`
fn name_only(text: &str) -> String {
    split_call(text.trim()).0.trim().to_string()
}

/// First `[[tag]]` of `line`: `Ok(Some((start, end, inner)))` with `end`
/// past the closing brackets, `Err(())` when the tag is never closed.
pub(crate) fn find_tag(line: &str) -> Result<Option<(usize, usize, &str)>, ()> {
    let Some(start) = line.find("[[") else {
        return Ok(None);
    };
    let inner_start = start + 2;
    let Some(length) = line[inner_start..].find("]]") else {
        return Err(());
    };
    let inner_end = inner_start + length;
    Ok(Some((start, inner_end + 2, &line[inner_start..inner_end])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tags() {
        assert_eq!(Tag::parse("VALUE:Albedo"), Tag::Value("Albedo".into()));
        assert_eq!(Tag::parse("VALUE:Albedo(input)"), Tag::Value("Albedo".into()));
        assert_eq!(Tag::parse("PROP:Main Color"), Tag::Prop("Main Color".into()));
        assert_eq!(Tag::parse("PROPERTIES"), Tag::Properties);
        assert_eq!(Tag::parse("INPUT_STRUCT_SEMANTICS:4"), Tag::InputStructSemantics(4));
        assert_eq!(
            Tag::parse("VARIABLES_OUTSIDE_CBUFFER_INCLUDE"),
            Tag::Variables {
                block: VariableBlock::OutsideBuffer,
                include: true
            }
        );
    }

    #[test]
    fn test_parse_sample_tags() {
        assert_eq!(
            Tag::parse("SAMPLE_VALUE_SHADER_PROPERTY:Ramp(uv = float2(ndl, 0.5), hide_channels)"),
            Tag::SampleProperty {
                name: "Ramp".into(),
                inline: true,
                options: SampleOptions {
                    uv: Some("float2(ndl, 0.5)".into()),
                    hide_channels: true,
                },
            }
        );
        assert_eq!(
            Tag::parse("SAMPLE_SHADER_PROPERTY:Albedo"),
            Tag::SampleProperty {
                name: "Albedo".into(),
                inline: false,
                options: SampleOptions::default(),
            }
        );
    }

    #[test]
    fn test_unknown_tags() {
        assert_eq!(Tag::parse("WHATEVER"), Tag::Unknown("WHATEVER".into()));
        assert_eq!(
            Tag::parse("INPUT_STRUCT_SEMANTICS:x"),
            Tag::Unknown("INPUT_STRUCT_SEMANTICS:x".into())
        );
    }

    #[test]
    fn test_find_tag() {
        assert_eq!(find_tag("a [[VALUE:X]] b"), Ok(Some((2, 13, "VALUE:X"))));
        assert_eq!(find_tag("plain"), Ok(None));
        assert_eq!(find_tag("broken [[VALUE:X"), Err(()));
    }
}
