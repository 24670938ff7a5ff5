//! Vertex-to-fragment interpolant packing.
//!
//! Scalars and small vectors sent to the fragment stage are merged into
//! 4-component registers, largest first:
//!
//! | width | packed with |
//! |-------|-------------|
//! | 4 | nothing, keeps its own name |
//! | 3 | one width-1 |
//! | 2 | one width-2, or up to two width-1 |
//! | 1 | up to three width-1 |
//!
//! The sort is stable, so the same input order always gives the same layout.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Channel letters used in the access expressions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwizzleStyle {
    #[default]
    Xyzw,
    Rgba,
}

impl SwizzleStyle {
    #[must_use]
    pub fn channels(self) -> [char; 4] {
        match self {
            Self::Xyzw => ['x', 'y', 'z', 'w'],
            Self::Rgba => ['r', 'g', 'b', 'a'],
        }
    }
}

/// A value sent to the fragment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedVariable {
    pub name: String,
    /// 1 to 4 components.
    pub width: usize,
    /// Scalar type (`float`, `half`, `fixed`).
    pub scalar: String,
}

impl NamedVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width: width.clamp(1, 4),
            scalar: "float".to_string(),
        }
    }

    /// Parses `float3 worldPos;` / `half rim`. A missing digit means width 1.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().trim_end_matches(';').trim();
        let (ty, name) = line.split_once(char::is_whitespace)?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let digits = ty.trim_start_matches(|c: char| !c.is_ascii_digit());
        let scalar = &ty[..ty.len() - digits.len()];
        let width = digits.parse::<usize>().unwrap_or(1);
        Some(Self {
            name: name.to_string(),
            width: width.clamp(1, 4),
            scalar: scalar.to_string(),
        })
    }

    /// Declaration type (`float3`, `float`).
    #[must_use]
    pub fn type_name(&self) -> String {
        if self.width > 1 {
            format!("{}{}", self.scalar, self.width)
        } else {
            self.scalar.clone()
        }
    }
}

/// One 4-component register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackGroup {
    pub register: String,
    pub variables: SmallVec<[NamedVariable; 4]>,
    /// `(variable, "register.swizzle")` in placement order.
    pub mapping: SmallVec<[(String, String); 4]>,
    /// The single width-4 variable keeps its name.
    pub keep_name: bool,
}

impl PackGroup {
    #[must_use]
    pub fn width(&self) -> usize {
        self.variables.iter().map(|v| v.width).sum()
    }

    /// `float4 pack0 : TEXCOORD3; /* pack0.xyz = normal  pack0.w = rim */`
    #[must_use]
    pub fn declaration(&self, semantic_index: usize, indent: &str) -> String {
        let width = self.width();
        let ty = if width > 1 { format!("float{width}") } else { "float".to_string() };
        let mut line = format!("{indent}{ty} {} : TEXCOORD{semantic_index};", self.register);
        if !self.keep_name {
            let comment: Vec<String> = self
                .mapping
                .iter()
                .map(|(name, access)| format!("{access} = {name}"))
                .collect();
            line.push_str(&format!(" /* {} */", comment.join("  ")));
        }
        line
    }
}

/// Result of packing one pass's interpolants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedInterpolants {
    groups: Vec<PackGroup>,
    /// Raw variables of passes that don't pack (surface passes).
    raw: Vec<NamedVariable>,
    access: FxHashMap<String, String>,
}

impl PackedInterpolants {
    /// Every variable maps to its own name; nothing is declared.
    #[must_use]
    pub fn identity(variables: &[NamedVariable]) -> Self {
        Self {
            groups: Vec::new(),
            raw: variables.to_vec(),
            access: variables.iter().map(|v| (v.name.clone(), v.name.clone())).collect(),
        }
    }

    /// Access expression of `name` (`pack0.zw`), if it travels through the interpolants.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.access.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn groups(&self) -> &[PackGroup] {
        &self.groups
    }

    #[must_use]
    pub fn is_packed(&self) -> bool {
        !self.groups.is_empty()
    }

    #[must_use]
    pub fn register_count(&self) -> usize {
        self.groups.len()
    }

    /// Struct fields starting at `TEXCOORD{first_semantic}`; `None` when not packed.
    #[must_use]
    pub fn declarations(&self, first_semantic: usize, indent: &str) -> Option<String> {
        if !self.is_packed() {
            return None;
        }
        let lines: Vec<String> = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, group)| group.declaration(first_semantic + i, indent))
            .collect();
        Some(lines.join("\n"))
    }

    /// Plain declarations of an unpacked pass (`float3 worldPos;`).
    #[must_use]
    pub fn raw_declarations(&self, indent: &str) -> Option<String> {
        if self.raw.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .raw
            .iter()
            .map(|v| format!("{indent}{} {};", v.type_name(), v.name))
            .collect();
        Some(lines.join("\n"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolantPacker {
    pub style: SwizzleStyle,
}

impl InterpolantPacker {
    #[must_use]
    pub fn new(style: SwizzleStyle) -> Self {
        Self { style }
    }

    #[must_use]
    pub fn pack(&self, variables: &[NamedVariable]) -> PackedInterpolants {
        // widths outside 1..=4 (hand-built variables) are clamped
        let mut sorted: Vec<NamedVariable> = variables
            .iter()
            .map(|v| NamedVariable {
                width: v.width.clamp(1, 4),
                ..v.clone()
            })
            .collect();
        sorted.sort_by(|a, b| b.width.cmp(&a.width));

        let mut used = vec![false; sorted.len()];
        let mut groups: Vec<(SmallVec<[NamedVariable; 4]>, bool)> = Vec::new();

        // first unused variable of `width`, marked as used
        let take = |width: usize, used: &mut Vec<bool>| -> Option<NamedVariable> {
            let index = sorted.iter().zip(used.iter()).position(|(v, &u)| !u && v.width == width)?;
            used[index] = true;
            Some(sorted[index].clone())
        };

        for i in 0..sorted.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let first = sorted[i].clone();
            let mut group: SmallVec<[NamedVariable; 4]> = SmallVec::new();
            let width = first.width;
            group.push(first);

            match width {
                4 => {
                    groups.push((group, true));
                    continue;
                }
                3 => group.extend(take(1, &mut used)),
                2 => match take(2, &mut used) {
                    Some(v) => group.push(v),
                    None => {
                        for _ in 0..2 {
                            match take(1, &mut used) {
                                Some(v) => group.push(v),
                                None => break,
                            }
                        }
                    }
                },
                _ => {
                    for _ in 0..3 {
                        match take(1, &mut used) {
                            Some(v) => group.push(v),
                            None => break,
                        }
                    }
                }
            }
            groups.push((group, false));
        }

        let channels = self.style.channels();
        let mut access = FxHashMap::default();
        let groups: Vec<PackGroup> = groups
            .into_iter()
            .enumerate()
            .map(|(index, (variables, keep_name))| {
                let register = if keep_name {
                    variables[0].name.clone()
                } else {
                    format!("pack{index}")
                };
                let mut mapping = SmallVec::new();
                let mut next = 0;
                for v in &variables {
                    let swizzle: String = channels[next..next + v.width].iter().collect();
                    next += v.width;
                    let expression = format!("{register}.{swizzle}");
                    access.insert(v.name.clone(), expression.clone());
                    mapping.push((v.name.clone(), expression));
                }
                PackGroup {
                    register,
                    variables,
                    mapping,
                    keep_name,
                }
            })
            .collect();

        log::debug!("Packed {} interpolants into {} registers", variables.len(), groups.len());

        PackedInterpolants {
            groups,
            raw: Vec::new(),
            access,
        }
    }
}
