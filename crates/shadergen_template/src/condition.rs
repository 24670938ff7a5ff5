//! Conditional directive automaton.
//!
//! Template lines containing the `///` marker are directives:
//!
//! ```text
//! /// IF USE_RIM && !NO_LIGHT
//!     kept when the expression holds
//! /// ELIF USE_SPEC            (alias: ELSEIF)
//!     kept when no earlier branch matched and USE_SPEC holds
//! /// ELSE
//!     kept when no earlier branch matched
//! ///
//! ```
//!
//! A bare `///` closes the innermost block. Directive lines never survive
//! into the reduced stream.

use shadergen_core::{Diagnostics, FeatureSet, ShaderGenError};

use crate::expression::Expr;

pub const CONDITION_MARKER: &str = "///";

/// One nesting level of an IF/ELIF/ELSE chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionFrame {
    /// Lines of the current branch are kept.
    pub active: bool,
    /// A branch of this chain already matched.
    pub resolved: bool,
}

/// A parsed directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    If(&'a str),
    ElseIf(&'a str),
    Else,
    End,
    /// `/// text` that isn't a directive keyword: a template comment.
    Comment,
}

impl<'a> Directive<'a> {
    /// Returns the directive carried by `line`, if the line holds the marker.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Directive<'a>> {
        let start = line.find(CONDITION_MARKER)?;
        let body = line[start + CONDITION_MARKER.len()..].trim();
        if body.is_empty() {
            return Some(Directive::End);
        }

        let (keyword, rest) = match body.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (body, ""),
        };
        Some(match keyword {
            "IF" => Directive::If(rest),
            "ELIF" | "ELSEIF" => Directive::ElseIf(rest),
            "ELSE" => Directive::Else,
            _ => Directive::Comment,
        })
    }
}

/// What the evaluator decided for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDecision {
    /// Regular line inside active branches.
    Keep,
    /// Regular line inside an inactive branch.
    Skip,
    /// Directive line, consumed.
    Directive,
}

/// Depth-stack automaton deciding, line by line, what survives.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    frames: Vec<ConditionFrame>,
    /// Line numbers of the IF that opened each frame.
    opened_at: Vec<usize>,
}

impl ConditionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    #[must_use]
    pub fn frames(&self) -> &[ConditionFrame] {
        &self.frames
    }

    /// `true` when every open frame is active (or none is open).
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.frames.last().is_none_or(|f| f.active)
    }

    fn parent_active(&self) -> bool {
        let len = self.frames.len();
        len < 2 || self.frames[len - 2].active
    }

    /// Feeds one line. Errors are recorded against `line_number` and the
    /// offending directive is treated as inert.
    pub fn evaluate(
        &mut self,
        line: &str,
        line_number: usize,
        features: &FeatureSet,
        diagnostics: &mut Diagnostics,
    ) -> LineDecision {
        // Marker lines (`#PASS`, `#VERTEX`...) never carry conditions.
        if line.starts_with('#') && line.contains(CONDITION_MARKER) {
            return LineDecision::Directive;
        }

        let Some(directive) = Directive::parse(line) else {
            return if self.is_active() {
                LineDecision::Keep
            } else {
                LineDecision::Skip
            };
        };

        match directive {
            Directive::If(expression) => {
                let parent_active = self.is_active();
                let frame = match Expr::parse(expression) {
                    Ok(expr) => {
                        let holds = expr.evaluate(features);
                        ConditionFrame {
                            active: holds && parent_active,
                            resolved: holds,
                        }
                    }
                    Err(err) => {
                        diagnostics.push(err, line_number);
                        ConditionFrame {
                            active: false,
                            resolved: true,
                        }
                    }
                };
                log::trace!("line {line_number}: IF {expression} -> {}", frame.active);
                self.frames.push(frame);
                self.opened_at.push(line_number);
            }
            Directive::ElseIf(expression) => {
                if self.frames.is_empty() {
                    diagnostics.push(ShaderGenError::UnmatchedDirective("ELIF".into()), line_number);
                    return LineDecision::Directive;
                }
                let parent_active = self.parent_active();
                let parsed = Expr::parse(expression);
                let Some(frame) = self.frames.last_mut() else {
                    return LineDecision::Directive;
                };
                if frame.resolved {
                    frame.active = false;
                } else {
                    match parsed {
                        Ok(expr) => {
                            let holds = expr.evaluate(features);
                            frame.active = holds && parent_active;
                            frame.resolved |= holds;
                        }
                        Err(err) => {
                            frame.active = false;
                            diagnostics.push(err, line_number);
                        }
                    }
                }
            }
            Directive::Else => {
                if self.frames.is_empty() {
                    diagnostics.push(ShaderGenError::UnmatchedDirective("ELSE".into()), line_number);
                    return LineDecision::Directive;
                }
                let parent_active = self.parent_active();
                if let Some(frame) = self.frames.last_mut() {
                    frame.active = parent_active && !frame.resolved;
                    frame.resolved = true;
                }
            }
            Directive::End => {
                if self.frames.pop().is_none() {
                    diagnostics.push(ShaderGenError::UnmatchedDirective("///".into()), line_number);
                } else {
                    self.opened_at.pop();
                }
            }
            Directive::Comment => {}
        }
        LineDecision::Directive
    }

    /// Closes the evaluation. Blocks still open are reported once, against
    /// the innermost opening IF, and are treated as closed.
    pub fn finish(&mut self, diagnostics: &mut Diagnostics) {
        if let Some(&line) = self.opened_at.last() {
            let count = self.frames.len();
            diagnostics.push(ShaderGenError::UnterminatedCondition { count, line }, line);
        }
        self.frames.clear();
        self.opened_at.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str], features: &[&str]) -> (Vec<String>, Diagnostics) {
        let features = FeatureSet::from(features);
        let mut diagnostics = Diagnostics::new();
        let mut evaluator = ConditionEvaluator::new();
        let mut kept = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if evaluator.evaluate(line, i + 1, &features, &mut diagnostics) == LineDecision::Keep {
                kept.push((*line).to_string());
            }
        }
        evaluator.finish(&mut diagnostics);
        (kept, diagnostics)
    }

    #[test]
    fn test_directive_parse() {
        assert_eq!(Directive::parse("\t/// IF A && B"), Some(Directive::If("A && B")));
        assert_eq!(Directive::parse("/// ELSEIF C"), Some(Directive::ElseIf("C")));
        assert_eq!(Directive::parse("/// ELSE"), Some(Directive::Else));
        assert_eq!(Directive::parse("  ///  "), Some(Directive::End));
        assert_eq!(Directive::parse("/// note to self"), Some(Directive::Comment));
        assert_eq!(Directive::parse("float a;"), None);
    }

    #[test]
    fn test_if_else() {
        let lines = ["/// IF A", "keep", "/// ELSE", "other", "///"];
        let (kept, diags) = run(&lines, &["A"]);
        assert_eq!(kept, vec!["keep"]);
        assert!(diags.is_empty());

        let (kept, _) = run(&lines, &[]);
        assert_eq!(kept, vec!["other"]);
    }

    #[test]
    fn test_elif_chain() {
        let lines = [
            "/// IF A", "a", "/// ELIF B", "b", "/// ELIF C", "c", "/// ELSE", "none", "///",
        ];
        assert_eq!(run(&lines, &["B", "C"]).0, vec!["b"]);
        assert_eq!(run(&lines, &["C"]).0, vec!["c"]);
        assert_eq!(run(&lines, &["A", "B"]).0, vec!["a"]);
        assert_eq!(run(&lines, &[]).0, vec!["none"]);
    }

    #[test]
    fn test_nested_inactive_parent() {
        let lines = ["/// IF A", "/// IF B", "ab", "/// ELSE", "a_not_b", "///", "///", "tail"];
        assert_eq!(run(&lines, &["B"]).0, vec!["tail"]);
        assert_eq!(run(&lines, &["A"]).0, vec!["a_not_b", "tail"]);
    }

    #[test]
    fn test_unmatched_end_is_inert() {
        let (kept, diags) = run(&["a", "///", "b"], &[]);
        assert_eq!(kept, vec!["a", "b"]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.messages()[0].1, Some(2));
    }

    #[test]
    fn test_unterminated_reports_opening_line() {
        let (kept, diags) = run(&["x", "/// IF A", "y", "/// IF B", "z"], &["A", "B"]);
        assert_eq!(kept, vec!["x", "y", "z"]);
        let diag = diags.iter().next().unwrap();
        assert_eq!(
            diag.error,
            ShaderGenError::UnterminatedCondition { count: 2, line: 4 }
        );
    }

    #[test]
    fn test_malformed_if_keeps_balance() {
        let (kept, diags) = run(&["/// IF A $ B", "hidden", "/// ELSE", "also hidden", "///", "after"], &["A"]);
        assert_eq!(kept, vec!["after"]);
        assert_eq!(diags.len(), 1);
    }
}
