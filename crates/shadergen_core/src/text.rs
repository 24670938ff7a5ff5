//! Text helpers shared by the template, property and emission layers.

use rustc_hash::FxHashMap;

/// Leading spaces/tabs of a line.
#[inline]
#[must_use]
pub fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

/// `"Main Color"` -> `"mainColor"`; non alphanumeric characters are dropped
/// and uppercase the following character.
#[must_use]
pub fn to_lower_camel_case(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut upper = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if upper {
                output.extend(c.to_uppercase());
            } else {
                output.extend(c.to_lowercase());
            }
            upper = false;
        } else {
            upper = true;
        }
    }
    output
}

/// Splits `input` on `separator`, ignoring separators nested inside
/// `open`/`close` pairs or double quotes. Parts are trimmed, empty parts dropped.
#[must_use]
pub fn split_excluding_blocks(input: &str, separator: char, open: char, close: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == open && !in_quotes => depth += 1,
            c if c == close && !in_quotes => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 && !in_quotes => {
                push_trimmed(&mut parts, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    push_trimmed(&mut parts, &current);
    parts
}

fn push_trimmed(parts: &mut Vec<String>, part: &str) {
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}

/// Splits `name(args)` into `("name", Some("args"))`. The last `)` closes the list.
#[must_use]
pub fn split_call(input: &str) -> (&str, Option<&str>) {
    match input.find('(') {
        Some(start) if start > 0 => {
            let end = input.rfind(')').filter(|&e| e > start).unwrap_or(input.len());
            (&input[..start], Some(&input[start + 1..end]))
        }
        _ => (input, None),
    }
}

/// `key = value` options as found in declaration lines (`label = "Main Color"`).
///
/// A bare key without `=` is stored with the value `"true"`.
#[derive(Debug, Clone, Default)]
pub struct KeyValues {
    values: FxHashMap<String, String>,
}

impl KeyValues {
    /// Parses every part that isn't skipped by `skip` (e.g. nested `imp(...)` parts).
    pub fn parse<'a, I>(parts: I, skip: impl Fn(&str) -> bool) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = FxHashMap::default();
        for part in parts {
            let part = part.trim();
            if part.is_empty() || skip(part) {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) => {
                    values.insert(key.trim().to_string(), unquote(value.trim()).to_string());
                }
                None => {
                    values.insert(part.to_string(), "true".to_string());
                }
            }
        }
        Self { values }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => v.eq_ignore_ascii_case("true") || v == "1",
            None => default,
        }
    }

    #[must_use]
    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    #[must_use]
    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Removes one pair of surrounding double quotes.
#[must_use]
pub fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses `"(1, 0.5, 0)"` into 4 floats; missing components take `fill`.
#[must_use]
pub fn parse_vector(value: &str, fill: f32) -> [f32; 4] {
    let mut out = [fill; 4];
    let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
    for (slot, component) in out.iter_mut().zip(inner.split(',')) {
        if let Ok(v) = component.trim().parse::<f32>() {
            *slot = v;
        }
    }
    out
}

/// Shader literal for a scalar: always carries a decimal point (`1.0`, `0.25`).
#[must_use]
pub fn format_float(value: f32) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_whitespace() {
        assert_eq!(leading_whitespace("\t\t  foo"), "\t\t  ");
        assert_eq!(leading_whitespace("foo"), "");
        assert_eq!(leading_whitespace("   "), "   ");
    }

    #[test]
    fn test_lower_camel_case() {
        assert_eq!(to_lower_camel_case("Main Color"), "mainColor");
        assert_eq!(to_lower_camel_case("Rim Min/Max"), "rimMinMax");
        assert_eq!(to_lower_camel_case("Albedo"), "albedo");
    }

    #[test]
    fn test_split_excluding_blocks() {
        let parts = split_excluding_blocks(
            "fragment, label = \"A, B\", imp(float, default = 1), imp(constant)",
            ',',
            '(',
            ')',
        );
        assert_eq!(
            parts,
            vec!["fragment", "label = \"A, B\"", "imp(float, default = 1)", "imp(constant)"]
        );
    }

    #[test]
    fn test_split_call() {
        assert_eq!(split_call("Albedo(uv = x)"), ("Albedo", Some("uv = x")));
        assert_eq!(split_call("Albedo"), ("Albedo", None));
        assert_eq!(split_call("key(f(a), b)"), ("key", Some("f(a), b")));
    }

    #[test]
    fn test_key_values() {
        let kv = KeyValues::parse(
            ["default = 0.5", "label = \"Rim\"", "locked", "imp(float)"],
            |p| p.starts_with("imp("),
        );
        assert!((kv.get_f32("default", 0.0) - 0.5).abs() < f32::EPSILON);
        assert_eq!(kv.get("label"), Some("Rim"));
        assert!(kv.get_bool("locked", false));
        assert!(!kv.contains("imp(float)"));
    }

    #[test]
    fn test_parse_vector_and_format() {
        assert_eq!(parse_vector("(1, 0.5)", 0.0), [1.0, 0.5, 0.0, 0.0]);
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
    }
}
