//! Generator Configuration
//!
//! Everything a caller chooses for one generated shader: name, features,
//! keyword values, pragma flags and property overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use shadergen_codegen::GeneratorConfig;
//!
//! let config = GeneratorConfig::new("Toony Colors Pro 2/User/My Shader")
//!     .with_features(["RIM", "SPECULAR"])
//!     .with_keyword("RIM_LABEL", "Rim Lighting")
//!     .with_flag("noforwardadd");
//! ```

use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash, Hasher};

use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use shadergen_core::FeatureSet;
use shadergen_properties::{CustomMaterialProperty, Implementation, SwizzleStyle};

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Comment delimiters of the trailing stamp lines and decorative markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormat {
    pub config_prefix: String,
    pub config_suffix: String,
    pub hash_prefix: String,
    pub hash_suffix: String,
    /// Marks a decorative header line in the material property block.
    pub header_marker: String,
    /// Marks the separator closing a decorative header.
    pub separator_marker: String,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            config_prefix: "/* SG_CONFIG: ".to_string(),
            config_suffix: " */".to_string(),
            hash_prefix: "/* SG_HASH: ".to_string(),
            hash_suffix: " */".to_string(),
            header_marker: "SGHeader".to_string(),
            separator_marker: "SGSeparator".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

/// Choices applied to a template for one generation.
///
/// | Field | Description | Default |
/// |-------|-------------|---------|
/// | `shader_name` | `@%SHADER_NAME%@` | empty |
/// | `features` | enabled feature tokens | empty |
/// | `keywords` | `@%KEY%@` values | empty |
/// | `flags` | main pragma flags | empty |
/// | `extra_flags` | flags of named pragma blocks | empty |
/// | `implementations` | per-property implementation overrides | empty |
/// | `custom_properties` | shared material parameters | empty |
/// | `swizzle_style` | channels of packed interpolants | `xyzw` |
/// | `serialized` | opaque string stamped into the output | `None` |
/// | `format` | stamp delimiters | [`OutputFormat::default`] |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub shader_name: String,
    pub features: FeatureSet,
    pub keywords: BTreeMap<String, String>,
    pub flags: Vec<String>,
    pub extra_flags: BTreeMap<String, Vec<String>>,
    /// Replaces the implementations declared by the template, by property name.
    pub implementations: BTreeMap<String, Vec<Implementation>>,
    pub custom_properties: Vec<CustomMaterialProperty>,
    pub swizzle_style: SwizzleStyle,
    /// Serialized configuration appended as a comment; produced by the caller.
    pub serialized: Option<String>,
    pub format: OutputFormat,
}

impl GeneratorConfig {
    #[must_use]
    pub fn new(shader_name: impl Into<String>) -> Self {
        Self {
            shader_name: shader_name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.features.extend(features);
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        let flag = flag.into();
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    #[must_use]
    pub fn with_implementations(mut self, property: impl Into<String>, implementations: Vec<Implementation>) -> Self {
        self.implementations.insert(property.into(), implementations);
        self
    }

    #[must_use]
    pub fn with_custom_property(mut self, property: CustomMaterialProperty) -> Self {
        self.custom_properties.push(property);
        self
    }

    #[must_use]
    pub fn with_swizzle_style(mut self, style: SwizzleStyle) -> Self {
        self.swizzle_style = style;
        self
    }

    #[must_use]
    pub fn with_serialized(mut self, serialized: impl Into<String>) -> Self {
        self.serialized = Some(serialized.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Cache key over everything that affects the generated text.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = FxBuildHasher.build_hasher();
        self.shader_name.hash(&mut hasher);
        self.features.hash(&mut hasher);
        self.keywords.hash(&mut hasher);
        self.flags.hash(&mut hasher);
        self.extra_flags.hash(&mut hasher);
        self.swizzle_style.hash(&mut hasher);
        self.serialized.hash(&mut hasher);
        self.format.hash(&mut hasher);
        // implementations carry floats; their JSON form is stable
        for (name, implementations) in &self.implementations {
            name.hash(&mut hasher);
            serde_json::to_string(implementations).unwrap_or_default().hash(&mut hasher);
        }
        serde_json::to_string(&self.custom_properties)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }
}
