//! Template metadata scanning.
//!
//! Read-only queries over template lines: header fields, the property
//! declaration block, which values each pass uses, per-pass input
//! variables and surface passes.

use crate::condition::Directive;
use crate::reducer::{is_pass_marker, TemplateLine, END_MARKER};

/// `#ID=`, `#INFO=`... lines found before the `Shader` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateHeader {
    pub id: Option<String>,
    pub info: Option<String>,
    pub warning: Option<String>,
    pub config_type: Option<String>,
    pub template_keywords: Vec<String>,
}

impl TemplateHeader {
    #[must_use]
    pub fn scan(lines: &[TemplateLine]) -> Self {
        let mut header = Self::default();
        for line in lines {
            let text = line.text.trim_end();
            if text.starts_with("Shader") {
                break;
            }
            if let Some(v) = text.strip_prefix("#ID=") {
                header.id = Some(v.to_string());
            } else if let Some(v) = text.strip_prefix("#INFO=") {
                header.info = Some(v.replace("  ", "\n"));
            } else if let Some(v) = text.strip_prefix("#WARNING=") {
                header.warning = Some(v.replace("  ", "\n"));
            } else if let Some(v) = text.strip_prefix("#CONFIG=") {
                header.config_type = Some(v.to_lowercase());
            } else if let Some(v) = text.strip_prefix("#TEMPLATE_KEYWORDS=") {
                header.template_keywords = v.split(',').map(|k| k.trim().to_string()).collect();
            }
        }
        if header.id.is_none() {
            log::warn!("Missing ID in template metadata");
        }
        header
    }
}

/// Declaration lines of the `#PROPERTIES_NEW` block.
///
/// Comments, `header` lines and condition directives are left out: every
/// property is declared, usage decides what gets emitted.
#[must_use]
pub fn property_declarations(lines: &[TemplateLine]) -> Vec<TemplateLine> {
    let Some(start) = lines.iter().position(|l| l.text.starts_with("#PROPERTIES_NEW")) else {
        return Vec::new();
    };

    lines[start + 1..]
        .iter()
        .take_while(|l| !l.text.starts_with(END_MARKER))
        .filter(|l| {
            let trimmed = l.text.trim();
            !(trimmed.is_empty()
                || trimmed.starts_with("//")
                || l.text.starts_with('#')
                || trimmed.starts_with("header")
                || Directive::parse(trimmed).is_some())
        })
        .cloned()
        .collect()
}

/// Number of `#PASS` markers.
#[must_use]
pub fn pass_count(lines: &[TemplateLine]) -> usize {
    lines.iter().filter(|l| is_pass_marker(&l.text)).count()
}

/// A `[[VALUE:name]]` or `[[SAMPLE_VALUE_SHADER_PROPERTY:name]]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueUsage {
    pub name: String,
    pub pass: usize,
    pub line_number: usize,
}

/// Bracketed tag contents of a line, in order. An unclosed `[[` ends the scan.
pub fn bracket_tags(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find("[[")?;
        let after = &rest[start + 2..];
        let end = after.find("]]")?;
        rest = &after[end + 2..];
        Some(&after[..end])
    })
}

/// Values read after each `#PASS`; occurrences before the first pass are ignored.
#[must_use]
pub fn value_usages(lines: &[TemplateLine]) -> Vec<ValueUsage> {
    let mut usages = Vec::new();
    let mut pass: Option<usize> = None;

    for line in lines {
        if is_pass_marker(&line.text) {
            pass = Some(pass.map_or(0, |p| p + 1));
            continue;
        }
        let Some(pass) = pass else { continue };

        for tag in bracket_tags(&line.text) {
            let name = tag
                .strip_prefix("VALUE:")
                .or_else(|| tag.strip_prefix("SAMPLE_VALUE_SHADER_PROPERTY:"));
            if let Some(name) = name {
                let name = name.split('(').next().unwrap_or(name).trim();
                usages.push(ValueUsage {
                    name: name.to_string(),
                    pass,
                    line_number: line.line_number,
                });
            }
        }
    }
    usages
}

/// Lines of the `#INPUT_VARIABLES` block of `pass` (e.g. `float3 worldPos`).
///
/// `None` when the pass has no such block: the pass is a surface pass and
/// nothing gets packed.
#[must_use]
pub fn input_variables(lines: &[TemplateLine], pass: usize) -> Option<Vec<String>> {
    let mut current: Option<usize> = None;
    let mut iter = lines.iter();

    while let Some(line) = iter.next() {
        if is_pass_marker(&line.text) {
            current = Some(current.map_or(0, |p| p + 1));
            continue;
        }
        if current == Some(pass) && line.text.starts_with("#INPUT_VARIABLES") {
            let mut variables = Vec::new();
            for inner in iter.by_ref() {
                if inner.text.starts_with(END_MARKER) {
                    break;
                }
                let trimmed = inner.text.trim();
                if trimmed.is_empty() || inner.text.starts_with('#') || Directive::parse(trimmed).is_some() {
                    continue;
                }
                variables.push(trimmed.to_string());
            }
            return Some(variables);
        }
    }
    None
}

/// `true` when `pass` declares a `#pragma surface` function.
#[must_use]
pub fn is_surface_pass(lines: &[TemplateLine], pass: usize) -> bool {
    let mut current: Option<usize> = None;
    for line in lines {
        let trimmed = line.text.trim();
        if !trimmed.starts_with('#') {
            continue;
        }
        if is_pass_marker(&line.text) {
            let next = current.map_or(0, |p| p + 1);
            if next > pass {
                return false;
            }
            current = Some(next);
        }
        if current == Some(pass) && trimmed.contains("#pragma surface") {
            return true;
        }
    }
    false
}
