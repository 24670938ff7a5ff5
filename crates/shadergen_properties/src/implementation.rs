//! Implementations: the ways a property derives its value.
//!
//! [`ImplementationKind`] is a closed set. Every concern (material property
//! block, declarations, fragment/vertex sampling, needed features) is a single
//! `match` over it, so adding a kind means extending each of these functions.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use shadergen_core::text::{format_float, parse_vector, split_call, split_excluding_blocks, to_lower_camel_case, KeyValues};
use shadergen_core::{Result, ShaderGenError};

use crate::graph::PropertyGraph;
use crate::packer::PackedInterpolants;
use crate::types::{Operator, ProgramStage, ValueType};

/// Where a texture reads its coordinates from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum UvSource {
    #[default]
    Texcoord,
    ScreenSpace,
    WorldPosition { swizzle: String },
    /// Coordinates produced by another property.
    Property { name: String, swizzle: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HsvMode {
    #[default]
    Full,
    Colorize,
    Grayscale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureSource {
    pub variable: String,
    pub label: String,
    /// Default texture name (`white`, `black`, `bump`...).
    pub default: String,
    pub uv: UvSource,
    pub uv_channel: u32,
    pub tiling_offset: bool,
    /// Tiling/offset of the main texture applied once in the vertex shader.
    pub global_tiling_offset: bool,
    pub scrolling: bool,
    pub locked_uv: bool,
    pub swizzle: String,
    pub drawer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ImplementationKind {
    Constant { value: [f32; 4], value_type: ValueType },
    ConstantFloat { value: f32 },
    MaterialFloat { variable: String, label: String, default: f32, drawer: String },
    MaterialRange { variable: String, label: String, default: f32, min: f32, max: f32, drawer: String },
    MaterialVector { variable: String, label: String, default: [f32; 4], swizzle: String, drawer: String },
    MaterialColor {
        variable: String,
        label: String,
        default: [f32; 4],
        hdr: bool,
        swizzle: String,
        drawer: String,
    },
    MaterialTexture(TextureSource),
    VertexColor { swizzle: String },
    VertexTexcoord { channel: u32, swizzle: String },
    WorldPosition { swizzle: String },
    /// Value of another property.
    Reference { target: String, swizzle: Option<String> },
    /// A parameter shared between properties, see [`CustomMaterialProperty`].
    CustomMaterialProperty { name: String, swizzle: Option<String> },
    /// Special value injected by the template, with the features it needs.
    Generic { code: String, features: Vec<String> },
    CustomCode { code: String, prepend: Option<String> },
    Hsv { mode: HsvMode, hue: String, saturation: String, value: String, label: String },
    Enum { variable: String, label: String, enum_type: String, default: u32 },
    /// Placeholder whose value is computed by the template itself.
    Hook { label: String },
}

/// One step of a property's derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub locked: bool,
    /// Declared in the per-instance buffer.
    #[serde(default)]
    pub gpu_instanced: bool,
    #[serde(flatten)]
    pub kind: ImplementationKind,
}

/// A material parameter shared by several properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMaterialProperty {
    pub name: String,
    pub implementation: Implementation,
}

/// Read-only lookups available while emitting one property in one pass.
#[derive(Clone, Copy)]
pub struct EmitEnv<'a> {
    pub stage: ProgramStage,
    /// Name of the input struct variable (`input`, `v`...).
    pub input: &'a str,
    /// Name of the output struct variable.
    pub output: &'a str,
    /// The current pass declares a surface lighting function.
    pub pass_has_lighting: bool,
    pub graph: &'a PropertyGraph,
    pub custom_properties: &'a [CustomMaterialProperty],
    /// `None` before the pass's interpolants are known.
    pub interpolants: Option<&'a PackedInterpolants>,
    /// Coordinates forced by the tag (`uv = ...`).
    pub uv_override: Option<&'a str>,
    /// Drop the channel swizzle from material values.
    pub hide_channels: bool,
}

impl Implementation {
    #[must_use]
    pub fn new(kind: ImplementationKind) -> Self {
        Self {
            operator: Operator::default(),
            locked: false,
            gpu_instanced: false,
            kind,
        }
    }

    #[must_use]
    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Declaration keyword of the kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ImplementationKind::Constant { .. } => "constant",
            ImplementationKind::ConstantFloat { .. } => "constant_float",
            ImplementationKind::MaterialFloat { .. } => "float",
            ImplementationKind::MaterialRange { .. } => "range",
            ImplementationKind::MaterialVector { .. } => "vector",
            ImplementationKind::MaterialColor { .. } => "color",
            ImplementationKind::MaterialTexture(_) => "texture",
            ImplementationKind::VertexColor { .. } => "vertex_color",
            ImplementationKind::VertexTexcoord { .. } => "vertex_texcoord",
            ImplementationKind::WorldPosition { .. } => "world_position",
            ImplementationKind::Reference { .. } => "shader_property_ref",
            ImplementationKind::CustomMaterialProperty { .. } => "custom_material_property",
            ImplementationKind::Generic { .. } => "generic",
            ImplementationKind::CustomCode { .. } => "custom_code",
            ImplementationKind::Hsv { .. } => "hsv",
            ImplementationKind::Enum { .. } => "enum",
            ImplementationKind::Hook { .. } => "hook",
        }
    }

    /// `false` for kinds that are not concatenated with an operator.
    #[must_use]
    pub fn has_operator(&self) -> bool {
        !matches!(
            self.kind,
            ImplementationKind::CustomCode { .. } | ImplementationKind::Hsv { .. }
        )
    }

    #[must_use]
    pub fn is_hook(&self) -> bool {
        matches!(self.kind, ImplementationKind::Hook { .. })
    }

    /// Properties this implementation reads from.
    #[must_use]
    pub fn referenced_property(&self) -> Option<&str> {
        match &self.kind {
            ImplementationKind::Reference { target, .. } => Some(target),
            ImplementationKind::MaterialTexture(TextureSource {
                uv: UvSource::Property { name, .. },
                ..
            }) => Some(name),
            _ => None,
        }
    }

    /// Statement to place on its own line before the sampling line.
    #[must_use]
    pub fn prepend_statement(&self) -> Option<&str> {
        match &self.kind {
            ImplementationKind::CustomCode { prepend: Some(p), .. } if !p.trim().is_empty() => Some(p),
            _ => None,
        }
    }

    /// Shader variable owned by this implementation, if any.
    #[must_use]
    pub fn variable(&self) -> Option<&str> {
        match &self.kind {
            ImplementationKind::MaterialFloat { variable, .. }
            | ImplementationKind::MaterialRange { variable, .. }
            | ImplementationKind::MaterialVector { variable, .. }
            | ImplementationKind::MaterialColor { variable, .. }
            | ImplementationKind::MaterialTexture(TextureSource { variable, .. })
            | ImplementationKind::Enum { variable, .. } => Some(variable),
            _ => None,
        }
    }

    /// Texcoord channel read through the interpolants and its width.
    #[must_use]
    pub fn texcoord_usage(&self) -> Option<(u32, usize)> {
        match &self.kind {
            ImplementationKind::MaterialTexture(TextureSource {
                uv: UvSource::Texcoord,
                uv_channel,
                ..
            }) => Some((*uv_channel, 2)),
            ImplementationKind::VertexTexcoord { channel, swizzle } => {
                let width = if swizzle.contains(['w', 'a']) {
                    4
                } else if swizzle.contains(['z', 'b']) {
                    3
                } else {
                    2
                };
                Some((*channel, width))
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Material property block
    // ------------------------------------------------------------------

    /// Line(s) for the material property block; `owner` is the property name.
    #[must_use]
    pub fn property_block(&self, owner: &str, indent: &str) -> Option<String> {
        let line = match &self.kind {
            ImplementationKind::MaterialFloat { variable, label, default, drawer } => {
                format!("{}{variable} (\"{label}\", Float) = {}", drawer_prefix(drawer), format_number(*default))
            }
            ImplementationKind::MaterialRange { variable, label, default, min, max, drawer } => format!(
                "{}{variable} (\"{label}\", Range({},{})) = {}",
                drawer_prefix(drawer),
                format_number(*min),
                format_number(*max),
                format_number(*default)
            ),
            ImplementationKind::MaterialVector { variable, label, default, drawer, .. } => {
                format!("{}{variable} (\"{label}\", Vector) = {}", drawer_prefix(drawer), format_tuple(default))
            }
            ImplementationKind::MaterialColor { variable, label, default, hdr, swizzle, drawer } => {
                let mut prefix = drawer_prefix(drawer);
                if swizzle.len() < 4 && drawer.is_empty() {
                    prefix.push_str("[TCP2ColorNoAlpha] ");
                }
                if *hdr {
                    prefix.push_str("[HDR] ");
                }
                format!("{prefix}{variable} (\"{label}\", Color) = {}", format_tuple(default))
            }
            ImplementationKind::MaterialTexture(texture) => {
                let mut line = drawer_prefix(&texture.drawer);
                if !texture.tiling_offset {
                    line.push_str("[NoScaleOffset] ");
                }
                line.push_str(&format!(
                    "{} (\"{}\", 2D) = \"{}\" {{}}",
                    texture.variable, texture.label, texture.default
                ));
                if texture.scrolling {
                    line.push_str(&format!(
                        "\n{indent}[TCP2UVScrolling] {}_SC (\"{} UV Scrolling\", Vector) = (1,1,0,0)",
                        texture.variable, texture.label
                    ));
                }
                line
            }
            ImplementationKind::Hsv { hue, saturation, value, label, mode } => {
                let label = if label.is_empty() { owner } else { label.as_str() };
                let mut lines = Vec::with_capacity(3);
                if *mode != HsvMode::Grayscale {
                    lines.push(format!("{hue} (\"{label} Hue\", Range(-180,180)) = 0"));
                }
                lines.push(format!("{saturation} (\"{label} Saturation\", Range(-2,2)) = 0"));
                if *mode != HsvMode::Grayscale {
                    lines.push(format!("{value} (\"{label} Value\", Range(-2,2)) = 0"));
                }
                lines.join(&format!("\n{indent}"))
            }
            ImplementationKind::Enum { variable, label, enum_type, default } => {
                format!("[Enum({enum_type})] {variable} (\"{label}\", Float) = {default}")
            }
            _ => return None,
        };
        Some(line)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Uniform declaration(s) inside the constant buffer.
    #[must_use]
    pub fn declare(&self, indent: &str) -> Option<String> {
        if self.is_instanced() {
            return None;
        }
        let line = match &self.kind {
            ImplementationKind::MaterialFloat { variable, .. }
            | ImplementationKind::MaterialRange { variable, .. }
            | ImplementationKind::Enum { variable, .. } => format!("float {variable};"),
            ImplementationKind::MaterialVector { variable, .. } => format!("float4 {variable};"),
            ImplementationKind::MaterialColor { variable, hdr, .. } => {
                format!("{} {variable};", if *hdr { "half4" } else { "fixed4" })
            }
            ImplementationKind::MaterialTexture(texture) => {
                let mut lines = Vec::new();
                if texture.tiling_offset {
                    lines.push(format!("float4 {}_ST;", texture.variable));
                }
                if texture.scrolling {
                    lines.push(format!("half4 {}_SC;", texture.variable));
                }
                if lines.is_empty() {
                    return None;
                }
                lines.join(&format!("\n{indent}"))
            }
            ImplementationKind::Hsv { hue, saturation, value, mode, .. } => match mode {
                HsvMode::Grayscale => format!("float {saturation};"),
                _ => format!("float {hue};\n{indent}float {saturation};\n{indent}float {value};"),
            },
            _ => return None,
        };
        Some(line)
    }

    /// Declaration inside the per-instance property buffer.
    #[must_use]
    pub fn declare_instanced(&self) -> Option<String> {
        if !self.is_instanced() {
            return None;
        }
        let (ty, variable) = match &self.kind {
            ImplementationKind::MaterialFloat { variable, .. }
            | ImplementationKind::MaterialRange { variable, .. }
            | ImplementationKind::Enum { variable, .. } => ("float", variable),
            ImplementationKind::MaterialVector { variable, .. } => ("float4", variable),
            ImplementationKind::MaterialColor { variable, hdr, .. } => (if *hdr { "half4" } else { "fixed4" }, variable),
            _ => return None,
        };
        Some(format!("UNITY_DEFINE_INSTANCED_PROP({ty}, {variable})"))
    }

    /// Only plain material values can live in the instance buffer.
    #[must_use]
    pub fn is_instanced(&self) -> bool {
        self.gpu_instanced
            && matches!(
                self.kind,
                ImplementationKind::MaterialFloat { .. }
                    | ImplementationKind::MaterialRange { .. }
                    | ImplementationKind::MaterialVector { .. }
                    | ImplementationKind::MaterialColor { .. }
                    | ImplementationKind::Enum { .. }
            )
    }

    fn access(&self, variable: &str) -> String {
        if self.is_instanced() {
            format!("UNITY_ACCESS_INSTANCED_PROP(Props, {variable})")
        } else {
            variable.to_string()
        }
    }

    /// Declaration that must live outside the constant buffer (samplers).
    #[must_use]
    pub fn declare_outside_cbuffer(&self) -> Option<String> {
        match &self.kind {
            ImplementationKind::MaterialTexture(texture) => Some(format!("sampler2D {};", texture.variable)),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    /// Expression for the stage in `env`.
    pub fn emit(&self, env: &EmitEnv<'_>) -> Result<String> {
        match env.stage {
            ProgramStage::Vertex => self.emit_vertex(env),
            ProgramStage::FixedFunction => Ok(self.emit_fixed_function()),
            ProgramStage::Fragment | ProgramStage::Undefined => self.emit_fragment(env),
        }
    }

    pub fn emit_fragment(&self, env: &EmitEnv<'_>) -> Result<String> {
        self.sample(env, ProgramStage::Fragment, None)
    }

    pub fn emit_vertex(&self, env: &EmitEnv<'_>) -> Result<String> {
        self.sample(env, ProgramStage::Vertex, None)
    }

    /// Render state value (`[_Cull]`, `2`).
    #[must_use]
    pub fn emit_fixed_function(&self) -> String {
        match &self.kind {
            ImplementationKind::Constant { value, .. } => format!("{}", value[0]),
            ImplementationKind::ConstantFloat { value } => format!("{value}"),
            ImplementationKind::MaterialFloat { variable, .. }
            | ImplementationKind::MaterialRange { variable, .. }
            | ImplementationKind::Enum { variable, .. } => format!("[{variable}]"),
            ImplementationKind::Hook { label } => label.clone(),
            _ => String::new(),
        }
    }

    fn sample(&self, env: &EmitEnv<'_>, stage: ProgramStage, swizzle: Option<&str>) -> Result<String> {
        let channels = |own: &str| -> String {
            if env.hide_channels {
                String::new()
            } else {
                format!(".{}", swizzle.unwrap_or(own))
            }
        };

        Ok(match &self.kind {
            ImplementationKind::Constant { value, value_type } => format_constant(value, *value_type),
            ImplementationKind::ConstantFloat { value } => format_float(*value),
            ImplementationKind::MaterialFloat { variable, .. }
            | ImplementationKind::MaterialRange { variable, .. }
            | ImplementationKind::Enum { variable, .. } => self.access(variable),
            ImplementationKind::MaterialVector { variable, swizzle: own, .. }
            | ImplementationKind::MaterialColor { variable, swizzle: own, .. } => {
                format!("{}{}", self.access(variable), channels(own))
            }
            ImplementationKind::MaterialTexture(texture) => {
                let coords = texture_coords(texture, env, stage)?;
                let swz = swizzle.unwrap_or(&texture.swizzle);
                if stage == ProgramStage::Vertex {
                    format!("tex2Dlod({}, float4({coords}, 0, 0)).{swz}", texture.variable)
                } else {
                    format!("tex2D({}, {coords}).{swz}", texture.variable)
                }
            }
            ImplementationKind::VertexColor { swizzle: own } => {
                format!("{}.vertexColor.{}", env.input, swizzle.unwrap_or(own))
            }
            ImplementationKind::VertexTexcoord { channel, swizzle: own } => {
                let name = format!("texcoord{channel}");
                let packed = match stage {
                    ProgramStage::Vertex => None,
                    _ => env.interpolants.and_then(|i| i.get(&name)),
                };
                format!("{}.{}.{}", env.input, packed.unwrap_or(&name), swizzle.unwrap_or(own))
            }
            ImplementationKind::WorldPosition { swizzle: own } => {
                format!("worldPosUv.{}", swizzle.unwrap_or(own))
            }
            ImplementationKind::Reference { target, swizzle: own } => {
                let property = env
                    .graph
                    .get_by_name(target)
                    .ok_or_else(|| ShaderGenError::UnknownProperty(target.clone()))?;
                let variable = property.variable_name();
                let prefix = if property.is_lighting() && env.pass_has_lighting {
                    format!("{}.", env.output)
                } else {
                    String::new()
                };
                match swizzle.or(own.as_deref()) {
                    Some(swz) if !swz.is_empty() => format!("{prefix}{variable}.{swz}"),
                    _ => format!("{prefix}{variable}"),
                }
            }
            ImplementationKind::CustomMaterialProperty { name, swizzle: own } => {
                let (target, swizzle) = resolve_custom(env, name, swizzle.or(own.as_deref()))?;
                target.sample(env, stage, swizzle)?
            }
            ImplementationKind::Generic { code, .. } => code.clone(),
            ImplementationKind::CustomCode { code, .. } => {
                if code.starts_with(char::is_whitespace) {
                    code.clone()
                } else {
                    format!(" {code}")
                }
            }
            // wraps the accumulated value, see `wrap`
            ImplementationKind::Hsv { .. } => String::new(),
            ImplementationKind::Hook { label } => label.clone(),
        })
    }

    /// Wraps the value accumulated so far; only color modifiers do this.
    #[must_use]
    pub fn wrap(&self, accumulated: &str, value_type: ValueType) -> Option<String> {
        let ImplementationKind::Hsv { mode, hue, saturation, value, .. } = &self.kind else {
            return None;
        };
        Some(match mode {
            HsvMode::Full => format!(
                "ApplyHSV_{}({accumulated}, {hue}, {saturation}, {value})",
                value_type.channel_count().max(3)
            ),
            HsvMode::Colorize => format!("ColorizeHSV({accumulated}, {hue}, {saturation}, {value})"),
            HsvMode::Grayscale => format!("ApplyHSVGrayscale({accumulated}, {saturation})"),
        })
    }

    // ------------------------------------------------------------------
    // Features
    // ------------------------------------------------------------------

    /// Feature tokens the template must enable when this implementation is used.
    #[must_use]
    pub fn needed_features(&self, program: ProgramStage, custom: &[CustomMaterialProperty]) -> Vec<String> {
        let vertex = program == ProgramStage::Vertex;
        match &self.kind {
            ImplementationKind::VertexColor { .. } => {
                let mut features = vec!["USE_VERTEX_COLORS_VERT".to_string()];
                if !vertex {
                    features.push("USE_VERTEX_COLORS_FRAG".to_string());
                }
                features
            }
            ImplementationKind::WorldPosition { .. } => vec![world_position_feature(vertex)],
            ImplementationKind::MaterialTexture(texture) => match texture.uv {
                UvSource::ScreenSpace => vec![if vertex {
                    "USE_SCREEN_SPACE_UV_VERTEX".to_string()
                } else {
                    "USE_SCREEN_SPACE_UV_FRAGMENT".to_string()
                }],
                UvSource::WorldPosition { .. } => vec![world_position_feature(vertex)],
                _ => Vec::new(),
            },
            ImplementationKind::Hsv { mode, .. } => vec![match mode {
                HsvMode::Full => "USE_HSV_FULL".to_string(),
                HsvMode::Colorize => "USE_HSV_COLORIZE".to_string(),
                HsvMode::Grayscale => "USE_HSV_GRAYSCALE".to_string(),
            }],
            ImplementationKind::Generic { features, .. } => features.clone(),
            ImplementationKind::CustomMaterialProperty { name, .. } => custom
                .iter()
                .find(|c| &c.name == name)
                .map(|c| c.implementation.needed_features(program, &[]))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Parses the inside of `imp(kind, key = value, ...)` for property `owner`.
    pub fn parse(source: &str, owner: &str, value_type: ValueType) -> Result<Self> {
        let parts = split_excluding_blocks(source, ',', '(', ')');
        let Some(kind) = parts.first() else {
            return Err(ShaderGenError::UnknownImplementation(source.to_string()));
        };
        let options = KeyValues::parse(parts.iter().skip(1).map(String::as_str), |_| false);

        let variable = || options.get_string("variable", &default_variable(owner));
        let label = || options.get_string("label", owner);
        let drawer = || options.get_string("drawer", "");
        let swizzle_or = |default: &str| options.get_string("swizzle", default).to_lowercase();
        let channels_or = |default: &str| {
            options
                .get("channels")
                .or_else(|| options.get("swizzle"))
                .unwrap_or(default)
                .to_lowercase()
        };
        let required = |key: &str| {
            options.get(key).map(str::to_string).ok_or_else(|| {
                ShaderGenError::InvalidPropertyDeclaration(format!("'{owner}': imp({kind}) needs '{key}'"))
            })
        };

        let kind = match kind.as_str() {
            "constant" => ImplementationKind::Constant {
                value: if value_type.is_color() {
                    parse_color(options.get("default").unwrap_or("(1,1,1,1)"))
                } else {
                    parse_vector(options.get("default").unwrap_or("0"), 0.0)
                },
                value_type,
            },
            "constant_float" => ImplementationKind::ConstantFloat {
                value: options.get_f32("default", 0.0),
            },
            "float" => ImplementationKind::MaterialFloat {
                variable: variable(),
                label: label(),
                default: options.get_f32("default", 1.0),
                drawer: drawer(),
            },
            "range" => ImplementationKind::MaterialRange {
                variable: variable(),
                label: label(),
                default: options.get_f32("default", 0.5),
                min: options.get_f32("min", 0.0),
                max: options.get_f32("max", 1.0),
                drawer: drawer(),
            },
            "vector" => ImplementationKind::MaterialVector {
                variable: variable(),
                label: label(),
                default: parse_vector(options.get("default").unwrap_or("(1,1,1,1)"), 0.0),
                swizzle: swizzle_or(value_type.default_swizzle(false)),
                drawer: drawer(),
            },
            "color" => ImplementationKind::MaterialColor {
                variable: variable(),
                label: label(),
                default: parse_color(options.get("default").unwrap_or("(1,1,1,1)")),
                hdr: options.get_bool("hdr", false),
                swizzle: swizzle_or(value_type.default_swizzle(true)),
                drawer: drawer(),
            },
            "texture" => {
                let uv = if options.get_bool("uv_screenspace", false) {
                    UvSource::ScreenSpace
                } else if options.get_bool("uv_worldpos", false) {
                    UvSource::WorldPosition {
                        swizzle: options.get_string("uv_swizzle", "xy").to_lowercase(),
                    }
                } else if let Some(name) = options.get("uv_shaderproperty") {
                    UvSource::Property {
                        name: name.to_string(),
                        swizzle: options.get_string("uv_swizzle", "xy").to_lowercase(),
                    }
                } else {
                    UvSource::Texcoord
                };
                ImplementationKind::MaterialTexture(TextureSource {
                    variable: variable(),
                    label: label(),
                    default: options.get_string("default", "white"),
                    uv,
                    uv_channel: options.get_u32("uv_channel", 0),
                    tiling_offset: options.get_bool("tiling_offset", false),
                    global_tiling_offset: options.get_bool("global", false),
                    scrolling: options.get_bool("scrolling", false),
                    locked_uv: options.get_bool("locked_uv", false),
                    swizzle: channels_or(value_type.default_swizzle(true)),
                    drawer: drawer(),
                })
            }
            "vertex_color" => ImplementationKind::VertexColor {
                swizzle: swizzle_or(value_type.default_swizzle(true)),
            },
            "vertex_texcoord" => ImplementationKind::VertexTexcoord {
                channel: options.get_u32("uv_channel", options.get_u32("channel", 0)),
                swizzle: swizzle_or(value_type.default_swizzle(false)),
            },
            "world_position" => {
                let default = value_type.default_swizzle(false);
                ImplementationKind::WorldPosition {
                    swizzle: swizzle_or(&default[..default.len().min(3)]),
                }
            }
            "shader_property_ref" | "shader_property_reference" => ImplementationKind::Reference {
                target: required("reference")?,
                swizzle: options.get("swizzle").map(str::to_lowercase),
            },
            "custom_material_property" => ImplementationKind::CustomMaterialProperty {
                name: required("reference").or_else(|_| required("name"))?,
                swizzle: options.get("swizzle").map(str::to_lowercase),
            },
            "generic" => ImplementationKind::Generic {
                code: options.get_string("code", ""),
                features: options
                    .get("features")
                    .map(|f| f.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            },
            "custom_code" => ImplementationKind::CustomCode {
                code: required("code")?,
                prepend: options.get("prepend").map(str::to_string),
            },
            "hsv" => {
                let pascal = pascal_case(owner);
                ImplementationKind::Hsv {
                    mode: match options.get("mode") {
                        Some("colorize") => HsvMode::Colorize,
                        Some("grayscale") => HsvMode::Grayscale,
                        _ => HsvMode::Full,
                    },
                    hue: options.get_string("hue", &format!("_{pascal}_Hue")),
                    saturation: options.get_string("saturation", &format!("_{pascal}_Saturation")),
                    value: options.get_string("value", &format!("_{pascal}_Value")),
                    label: options.get_string("label", ""),
                }
            }
            "enum" => ImplementationKind::Enum {
                variable: variable(),
                label: label(),
                enum_type: required("enum_type")?,
                default: options.get_u32("default", 0),
            },
            "hook" => ImplementationKind::Hook {
                label: options.get_string("label", &to_lower_camel_case(owner)),
            },
            other => return Err(ShaderGenError::UnknownImplementation(other.to_string())),
        };

        let operator = match options.get("op").or_else(|| options.get("operator")) {
            Some(op) => Operator::parse(op).ok_or_else(|| {
                ShaderGenError::InvalidPropertyDeclaration(format!("'{owner}': unknown operator '{op}'"))
            })?,
            None => Operator::default(),
        };

        Ok(Self {
            operator,
            locked: options.get_bool("locked", false),
            gpu_instanced: options.get_bool("gpu_instanced", false),
            kind,
        })
    }

    /// Parses every `imp(...)` part of a declaration.
    pub fn parse_all<'a, I>(parts: I, owner: &str, value_type: ValueType) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        parts
            .into_iter()
            .filter_map(|part| match split_call(part) {
                ("imp", Some(args)) => Some(Self::parse(args, owner, value_type)),
                _ => None,
            })
            .collect()
    }
}

fn world_position_feature(vertex: bool) -> String {
    if vertex {
        "USE_WORLD_POSITION_UV_VERTEX".to_string()
    } else {
        "USE_WORLD_POSITION_FRAGMENT".to_string()
    }
}

/// Coordinates expression of a texture sample, tiling and scrolling included.
/// Follows custom properties pointing at other custom properties down to
/// the first concrete implementation. The outermost swizzle wins.
fn resolve_custom<'e>(
    env: &EmitEnv<'e>,
    name: &'e str,
    mut swizzle: Option<&'e str>,
) -> Result<(&'e Implementation, Option<&'e str>)> {
    let mut visited: SmallVec<[&str; 4]> = SmallVec::new();
    let mut current = name;
    loop {
        let custom = env
            .custom_properties
            .iter()
            .find(|c| c.name == current)
            .ok_or_else(|| ShaderGenError::UnknownProperty(current.to_string()))?;
        visited.push(custom.name.as_str());

        let ImplementationKind::CustomMaterialProperty { name: next, swizzle: own } = &custom.implementation.kind else {
            return Ok((&custom.implementation, swizzle));
        };
        if visited.contains(&next.as_str()) {
            log::error!("Custom material property '{}' loops back to '{next}'", custom.name);
            return Err(ShaderGenError::CyclicReference {
                from: custom.name.clone(),
                to: next.clone(),
            });
        }
        swizzle = swizzle.or(own.as_deref());
        current = next;
    }
}

fn texture_coords(texture: &TextureSource, env: &EmitEnv<'_>, stage: ProgramStage) -> Result<String> {
    let vertex = stage == ProgramStage::Vertex;
    let base = if let Some(uv) = env.uv_override {
        uv.to_string()
    } else {
        match &texture.uv {
            UvSource::ScreenSpace => "screenUV".to_string(),
            UvSource::WorldPosition { swizzle } if vertex => format!("worldPosUv.{swizzle}"),
            UvSource::WorldPosition { swizzle } => format!("{}.worldPos.{swizzle}", env.input),
            UvSource::Property { name, swizzle } => {
                let property = env
                    .graph
                    .get_by_name(name)
                    .ok_or_else(|| ShaderGenError::UnknownProperty(name.clone()))?;
                if property.is_lighting() && env.pass_has_lighting {
                    format!("{}.{}.{swizzle}", env.output, property.variable_name())
                } else {
                    format!("{}.{swizzle}", property.variable_name())
                }
            }
            UvSource::Texcoord => {
                let name = format!("texcoord{}", texture.uv_channel);
                match env.interpolants.and_then(|i| i.get(&name)) {
                    Some(packed) => {
                        let source = if vertex { env.output } else { env.input };
                        format!("{source}.{packed}.xy")
                    }
                    None if vertex => format!("{}.{name}.xy", env.input),
                    None => return Err(ShaderGenError::MissingTexcoord(texture.label.clone())),
                }
            }
        }
    };

    let mut coords = base;
    let tiling_in_vertex = texture.global_tiling_offset && texture.uv == UvSource::Texcoord;
    if texture.tiling_offset && !tiling_in_vertex {
        if texture.uv == UvSource::ScreenSpace {
            coords.push_str(&format!(" * {}_ST.xy", texture.variable));
        } else {
            coords.push_str(&format!(" * {0}_ST.xy + {0}_ST.zw", texture.variable));
        }
    }
    if texture.scrolling {
        coords.push_str(&format!(" + frac(_Time.yy * {}_SC.xy)", texture.variable));
    }
    Ok(coords)
}

fn drawer_prefix(drawer: &str) -> String {
    if drawer.is_empty() {
        String::new()
    } else {
        format!("{drawer} ")
    }
}

/// `"Rim Min"` -> `"RimMin"`.
#[must_use]
pub fn pascal_case(name: &str) -> String {
    let camel = to_lower_camel_case(name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Material variable of a property: `"Rim Min"` -> `"_RimMin"`.
#[must_use]
pub fn default_variable(owner: &str) -> String {
    format!("_{}", pascal_case(owner))
}

fn parse_color(value: &str) -> [f32; 4] {
    let mut color = parse_vector(value, 0.0);
    if value.split(',').count() < 4 {
        color[3] = 1.0;
    }
    color
}

/// Material property literal: `1`, `0.5`.
fn format_number(value: f32) -> String {
    format!("{value}")
}

fn format_tuple(values: &[f32; 4]) -> String {
    format!(
        "({},{},{},{})",
        format_number(values[0]),
        format_number(values[1]),
        format_number(values[2]),
        format_number(values[3])
    )
}

fn format_constant(value: &[f32; 4], value_type: ValueType) -> String {
    let count = value_type.channel_count();
    if count == 1 {
        return format_float(value[0]);
    }
    let components: Vec<_> = value[..count].iter().map(|v| format_float(*v)).collect();
    format!("float{count}({})", components.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, value_type: ValueType) -> Implementation {
        Implementation::parse(source, "Main Color", value_type).unwrap()
    }

    #[test]
    fn test_default_variable() {
        assert_eq!(default_variable("Rim Min"), "_RimMin");
        assert_eq!(pascal_case("albedo"), "Albedo");
    }

    #[test]
    fn test_parse_color() {
        let imp = parse("color, default = (1,0.5,0,1), hdr", ValueType::Color);
        let ImplementationKind::MaterialColor { variable, default, hdr, swizzle, .. } = &imp.kind else {
            panic!("expected a color");
        };
        assert_eq!(variable, "_MainColor");
        assert_eq!(*default, [1.0, 0.5, 0.0, 1.0]);
        assert!(*hdr);
        assert_eq!(swizzle, "rgb");
        assert_eq!(imp.declare("\t").as_deref(), Some("half4 _MainColor;"));
        assert_eq!(
            imp.property_block("Main Color", "\t").as_deref(),
            Some("[TCP2ColorNoAlpha] [HDR] _MainColor (\"Main Color\", Color) = (1,0.5,0,1)")
        );
    }

    #[test]
    fn test_parse_operator_and_errors() {
        let imp = parse("range, op = +, min = -1, max = 2", ValueType::Float);
        assert_eq!(imp.operator, Operator::Add);
        assert_eq!(
            imp.property_block("Main Color", "").as_deref(),
            Some("_MainColor (\"Main Color\", Range(-1,2)) = 0.5")
        );
        assert!(matches!(
            Implementation::parse("sphere", "X", ValueType::Float),
            Err(ShaderGenError::UnknownImplementation(_))
        ));
        assert!(matches!(
            Implementation::parse("shader_property_ref", "X", ValueType::Float),
            Err(ShaderGenError::InvalidPropertyDeclaration(_))
        ));
    }

    #[test]
    fn test_texture_declarations() {
        let imp = parse("texture, tiling_offset, scrolling, variable = _MainTex", ValueType::ColorRgba);
        assert_eq!(imp.declare_outside_cbuffer().as_deref(), Some("sampler2D _MainTex;"));
        assert_eq!(
            imp.declare("\t").as_deref(),
            Some("float4 _MainTex_ST;\n\thalf4 _MainTex_SC;")
        );
        assert_eq!(imp.texcoord_usage(), Some((0, 2)));

        let imp = parse("texture", ValueType::Float);
        assert!(imp.property_block("A", "").is_some_and(|p| p.starts_with("[NoScaleOffset] ")));
        assert_eq!(imp.declare(""), None);
    }

    #[test]
    fn test_operator_opt_outs() {
        let code = parse("custom_code, code = \"saturate(x)\", prepend = \"float x = 1;\"", ValueType::Float);
        assert!(!code.has_operator());
        assert_eq!(code.prepend_statement(), Some("float x = 1;"));

        let hsv = parse("hsv, mode = grayscale", ValueType::Color);
        assert!(!hsv.has_operator());
        assert_eq!(
            hsv.wrap("c", ValueType::Color).as_deref(),
            Some("ApplyHSVGrayscale(c, _MainColor_Saturation)")
        );
        assert_eq!(hsv.needed_features(ProgramStage::Fragment, &[]), vec!["USE_HSV_GRAYSCALE"]);
    }

    #[test]
    fn test_needed_features() {
        let vc = parse("vertex_color", ValueType::Color);
        assert_eq!(
            vc.needed_features(ProgramStage::Fragment, &[]),
            vec!["USE_VERTEX_COLORS_VERT", "USE_VERTEX_COLORS_FRAG"]
        );
        assert_eq!(vc.needed_features(ProgramStage::Vertex, &[]), vec!["USE_VERTEX_COLORS_VERT"]);

        let tex = parse("texture, uv_screenspace", ValueType::Float);
        assert_eq!(
            tex.needed_features(ProgramStage::Fragment, &[]),
            vec!["USE_SCREEN_SPACE_UV_FRAGMENT"]
        );
    }

    #[test]
    fn test_fixed_function_and_constants() {
        let e = parse("enum, enum_type = UnityEngine.Rendering.CullMode, default = 2", ValueType::FixedFunctionEnum);
        assert_eq!(e.emit_fixed_function(), "[_MainColor]");
        assert!(e.property_block("", "").is_some_and(|p| p.starts_with("[Enum(UnityEngine.Rendering.CullMode)]")));

        assert_eq!(format_constant(&[1.0, 0.5, 0.0, 0.0], ValueType::Float3), "float3(1.0, 0.5, 0.0)");
        assert_eq!(format_constant(&[2.0, 0.0, 0.0, 0.0], ValueType::Float), "2.0");
    }

    #[test]
    fn test_gpu_instanced() {
        let imp = parse("color, gpu_instanced", ValueType::ColorRgba);
        assert_eq!(imp.declare(""), None);
        assert_eq!(imp.declare_instanced().as_deref(), Some("UNITY_DEFINE_INSTANCED_PROP(fixed4, _MainColor)"));
        assert_eq!(imp.access("_MainColor"), "UNITY_ACCESS_INSTANCED_PROP(Props, _MainColor)");

        let texture = parse("texture, gpu_instanced", ValueType::ColorRgba);
        assert!(!texture.is_instanced());
        assert_eq!(texture.declare_instanced(), None);
    }

    fn custom(name: &str, implementation: Implementation) -> CustomMaterialProperty {
        CustomMaterialProperty {
            name: name.to_string(),
            implementation,
        }
    }

    fn custom_ref(target: &str, swizzle: Option<&str>) -> Implementation {
        Implementation::new(ImplementationKind::CustomMaterialProperty {
            name: target.to_string(),
            swizzle: swizzle.map(str::to_string),
        })
    }

    #[test]
    fn test_custom_property_chains_and_loops() {
        let customs = [
            custom("Tint", parse("color", ValueType::Color)),
            custom("Shared", custom_ref("Tint", Some("r"))),
            custom("Loop", custom_ref("Loop", None)),
            custom("Ping", custom_ref("Pong", None)),
            custom("Pong", custom_ref("Ping", None)),
        ];
        let graph = PropertyGraph::new();
        let env = EmitEnv {
            stage: ProgramStage::Fragment,
            input: "input",
            output: "output",
            pass_has_lighting: false,
            graph: &graph,
            custom_properties: &customs,
            interpolants: None,
            uv_override: None,
            hide_channels: false,
        };

        assert_eq!(custom_ref("Tint", None).emit(&env).unwrap(), "_MainColor.rgb");
        assert_eq!(custom_ref("Shared", None).emit(&env).unwrap(), "_MainColor.r");
        assert_eq!(custom_ref("Shared", Some("g")).emit(&env).unwrap(), "_MainColor.g");

        let err = custom_ref("Loop", None).emit(&env).unwrap_err();
        assert_eq!(
            err,
            ShaderGenError::CyclicReference {
                from: "Loop".into(),
                to: "Loop".into()
            }
        );
        assert!(!err.is_fatal());
        assert!(matches!(
            custom_ref("Ping", None).emit(&env),
            Err(ShaderGenError::CyclicReference { .. })
        ));
        assert!(custom_ref("Missing", None).emit(&env).unwrap_err().is_fatal());
    }

    #[test]
    fn test_serde_tagging() {
        let imp = parse("float, default = 0.25", ValueType::Float);
        let json = serde_json::to_string(&imp).unwrap();
        assert!(json.contains("\"kind\":\"material_float\""));
        let back: Implementation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, imp);
    }
}
