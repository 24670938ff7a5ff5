//! Post-pass over emitted text and the trailing stamp lines.
//!
//! The stamp is two comment lines: the caller's serialized configuration,
//! then a 128-bit XXH3 hash of everything before the hash line. Hashing
//! runs on `\n`-normalized text, so the stamp survives line ending changes.

use xxhash_rust::xxh3::xxh3_128;

use crate::config::OutputFormat;

/// Cleans up emitted text:
///
/// - `\r\n` becomes `\n`
/// - a header line followed only by blank or `//` lines up to a separator
///   line is dropped together with them
/// - an empty `struct Input` gets a placeholder field
/// - consecutive blank lines collapse into one
#[must_use]
pub fn post_process(source: &str, format: &OutputFormat) -> String {
    let normalized = source.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let mut output: Vec<String> = Vec::with_capacity(lines.len());
    let mut last_was_empty = false;
    let mut in_input_struct = false;
    let mut input_struct_empty = false;
    let mut input_indent = "";

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if !format.header_marker.is_empty()
            && line.contains(format.header_marker.as_str())
            && let Some(separator) = empty_header_end(&lines, i, format)
        {
            i = separator + 1;
            continue;
        }
        i += 1;

        if line.trim_start().starts_with("struct Input") {
            in_input_struct = true;
            input_struct_empty = true;
            input_indent = shadergen_core::text::leading_whitespace(line);
        } else if in_input_struct {
            if line.contains('}') {
                in_input_struct = false;
                if input_struct_empty {
                    output.push(format!("{input_indent}\tfloat input_is_not_empty;"));
                    last_was_empty = false;
                }
            } else if !line.contains('{') && !line.trim().is_empty() {
                input_struct_empty = false;
            }
        }

        let empty = line.trim().is_empty();
        if !(empty && last_was_empty) {
            output.push(line.to_string());
        }
        last_was_empty = empty;
    }

    let mut text = output.join("\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Index of the separator closing an empty decorative header at `start`.
fn empty_header_end(lines: &[&str], start: usize, format: &OutputFormat) -> Option<usize> {
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        if line.is_empty() || line.trim().starts_with("//") {
            continue;
        }
        if !format.separator_marker.is_empty() && line.contains(format.separator_marker.as_str()) {
            return Some(j);
        }
        return None;
    }
    None
}

/// Hex form of the content hash of `text`, line endings normalized.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    format!("{:032x}", xxh3_128(normalized.as_bytes()))
}

/// Appends the configuration line (when given) and the hash line.
#[must_use]
pub fn stamp(body: &str, serialized: Option<&str>, format: &OutputFormat) -> String {
    let mut text = body.replace("\r\n", "\n");
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    if let Some(serialized) = serialized {
        text.push_str(&format!("{}{serialized}{}\n", format.config_prefix, format.config_suffix));
    }
    let hash = content_hash(&text);
    text.push_str(&format!("{}{hash}{}\n", format.hash_prefix, format.hash_suffix));
    text
}

/// Serialized configuration stored in a stamped source, if any.
#[must_use]
pub fn stamped_config<'s>(source: &'s str, format: &OutputFormat) -> Option<&'s str> {
    source.lines().rev().find_map(|line| {
        line.trim_end_matches('\r')
            .strip_prefix(format.config_prefix.as_str())?
            .strip_suffix(format.config_suffix.as_str())
    })
}

/// `Some(true)` when the stamped hash still matches the content before it,
/// `Some(false)` when the text was edited, `None` when there is no stamp.
#[must_use]
pub fn verify_stamp(source: &str, format: &OutputFormat) -> Option<bool> {
    let normalized = source.replace("\r\n", "\n");
    let trimmed = normalized.trim_end_matches('\n');
    let (content, last) = match trimmed.rfind('\n') {
        Some(index) => (&trimmed[..=index], &trimmed[index + 1..]),
        None => ("", trimmed),
    };
    let hash = last
        .strip_prefix(format.hash_prefix.as_str())?
        .strip_suffix(format.hash_suffix.as_str())?;
    Some(hash == content_hash(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> OutputFormat {
        OutputFormat::default()
    }

    #[test]
    fn test_collapse_blank_lines() {
        let out = post_process("a\n\n\n\nb\r\n\r\nc", &format());
        assert_eq!(out, "a\n\nb\n\nc\n");
    }

    #[test]
    fn test_empty_header_is_dropped() {
        let source = "\t[SGHeader(Rim)]\n\n\t// nothing here\n\t[SGSeparator]\n\t_Other (\"x\", Float) = 1";
        assert_eq!(post_process(source, &format()), "\t_Other (\"x\", Float) = 1\n");

        let kept = "\t[SGHeader(Rim)]\n\t_RimMin (\"Min\", Float) = 0\n\t[SGSeparator]";
        assert_eq!(post_process(kept, &format()), format!("{kept}\n"));
    }

    #[test]
    fn test_empty_input_struct() {
        let source = "\tstruct Input\n\t{\n\t};\n\tstruct Other\n\t{\n\t};";
        assert_eq!(
            post_process(source, &format()),
            "\tstruct Input\n\t{\n\t\tfloat input_is_not_empty;\n\t};\n\tstruct Other\n\t{\n\t};\n"
        );

        let filled = "struct Input\n{\n\tfloat2 texcoord0;\n};";
        assert_eq!(post_process(filled, &format()), format!("{filled}\n"));
    }

    #[test]
    fn test_stamp_and_verify() {
        let stamped = stamp("Shader \"X\"\n{\n}\n", Some("{\"a\":1}"), &format());
        let lines: Vec<&str> = stamped.lines().collect();
        assert_eq!(lines[3], "/* SG_CONFIG: {\"a\":1} */");
        assert!(lines[4].starts_with("/* SG_HASH: "));
        assert_eq!(lines[4].len(), "/* SG_HASH: ".len() + 32 + " */".len());

        assert_eq!(verify_stamp(&stamped, &format()), Some(true));
        assert_eq!(verify_stamp(&stamped.replace("\n", "\r\n"), &format()), Some(true));
        assert_eq!(verify_stamp(&stamped.replace("Shader", "Shadr"), &format()), Some(false));
        assert_eq!(verify_stamp("no stamp", &format()), None);
        assert_eq!(stamped_config(&stamped, &format()), Some("{\"a\":1}"));
    }

    #[test]
    fn test_hash_ignores_line_endings() {
        assert_eq!(content_hash("a\r\nb\r\n"), content_hash("a\nb\n"));
        assert_ne!(content_hash("a\nb\n"), content_hash("a\nc\n"));
    }
}
