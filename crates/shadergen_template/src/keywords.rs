//! `#KEYWORDS` block processing.
//!
//! The block toggles features, keyword values and pragma flags depending on
//! the features already enabled. Lines are tab separated:
//!
//! ```text
//! #KEYWORDS
//! /// IF RIM && !RIM_VERTEX
//!     feature_on      RIM_FRAGMENT
//! ///
//!     set_keyword     RIM_LABEL   Rim Lighting
//!     flag_on         noforwardadd
//!     flag_on:pragma_gpu_instancing   assumeuniformscaling
//! #END
//! ```
//!
//! A toggle that changes anything restarts the scan from the top, so the
//! order of lines in the block doesn't matter.

use std::collections::BTreeMap;

use shadergen_core::{Diagnostics, FeatureSet};

use crate::condition::{ConditionEvaluator, LineDecision};
use crate::reducer::{TemplateLine, END_MARKER};

/// Upper bound on scan restarts; a block that keeps toggling is cut off here.
pub const MAX_KEYWORD_RESTARTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordCommand<'a> {
    FeatureOn(&'a str),
    FeatureOff(&'a str),
    SetKeyword(&'a str, &'a str),
    FlagOn(&'a str),
    FlagOff(&'a str),
    BlockFlagOn { block: &'a str, flag: &'a str },
    BlockFlagOff { block: &'a str, flag: &'a str },
}

impl<'a> KeywordCommand<'a> {
    /// `None` for empty or unrecognised lines.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut parts = line.split('\t').map(str::trim).filter(|p| !p.is_empty());
        let command = parts.next()?;
        let arg = parts.next();

        if let Some(block) = command.strip_prefix("flag_on:") {
            return Some(Self::BlockFlagOn { block, flag: arg? });
        }
        if let Some(block) = command.strip_prefix("flag_off:") {
            return Some(Self::BlockFlagOff { block, flag: arg? });
        }

        Some(match command {
            "feature_on" | "enable_kw" => Self::FeatureOn(arg?),
            "feature_off" | "disable_kw" => Self::FeatureOff(arg?),
            "set_keyword" | "set" => Self::SetKeyword(arg?, parts.next().unwrap_or("")),
            "flag_on" | "enable_flag" => Self::FlagOn(arg?),
            "flag_off" | "disable_flag" => Self::FlagOff(arg?),
            _ => return None,
        })
    }
}

/// Everything a keyword block produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordState {
    /// Features turned on by the block.
    pub features: FeatureSet,
    pub keywords: BTreeMap<String, String>,
    /// Flags of the main pragma line, in insertion order.
    pub flags: Vec<String>,
    /// Flags of named pragma blocks (`flag_on:block`).
    pub extra_flags: BTreeMap<String, Vec<String>>,
}

impl KeywordState {
    /// Starts from configured flags.
    #[must_use]
    pub fn with_flags(flags: Vec<String>, extra_flags: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            flags,
            extra_flags,
            ..Default::default()
        }
    }

    /// Applies a command; returns `true` when a feature or flag toggled.
    pub fn apply(&mut self, command: KeywordCommand<'_>) -> bool {
        match command {
            KeywordCommand::FeatureOn(feature) => self.features.insert(feature),
            KeywordCommand::FeatureOff(feature) => self.features.remove(feature),
            KeywordCommand::SetKeyword(key, value) => {
                self.keywords.insert(key.to_string(), value.to_string());
                false
            }
            KeywordCommand::FlagOn(flag) => add_if_missing(&mut self.flags, flag),
            KeywordCommand::FlagOff(flag) => remove_if_present(&mut self.flags, flag),
            KeywordCommand::BlockFlagOn { block, flag } => {
                add_if_missing(self.extra_flags.entry(block.to_string()).or_default(), flag)
            }
            KeywordCommand::BlockFlagOff { block, flag } => {
                let Some(flags) = self.extra_flags.get_mut(block) else {
                    return false;
                };
                let removed = remove_if_present(flags, flag);
                if flags.is_empty() {
                    self.extra_flags.remove(block);
                }
                removed
            }
        }
    }

    /// `FLAGS:pragma_surface_shader` and `FLAGS:<block>` keyword values.
    #[must_use]
    pub fn flag_keywords(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("FLAGS:pragma_surface_shader".to_string(), self.flags.join(" "));
        for (block, flags) in &self.extra_flags {
            if !flags.is_empty() {
                out.insert(format!("FLAGS:{block}"), flags.join(" "));
            }
        }
        out
    }
}

fn add_if_missing(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}

fn remove_if_present(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}

/// Runs every `#KEYWORDS` block of `lines` (module-expanded, unreduced).
///
/// Conditions inside the block see `base` plus the features turned on so
/// far. Condition errors are reported from the final scan only.
pub fn process_keywords(
    lines: &[TemplateLine],
    base: &FeatureSet,
    mut state: KeywordState,
    diagnostics: &mut Diagnostics,
) -> KeywordState {
    for block in keyword_blocks(lines) {
        let mut restarts = 0usize;
        loop {
            let features = base.merged_with(&state.features);
            let mut scan_diagnostics = Diagnostics::new();
            let mut evaluator = ConditionEvaluator::new();
            let mut toggled = false;

            for line in block {
                let decision =
                    evaluator.evaluate(&line.text, line.line_number, &features, &mut scan_diagnostics);
                if decision != LineDecision::Keep {
                    continue;
                }
                if let Some(command) = KeywordCommand::parse(&line.text)
                    && state.apply(command)
                {
                    toggled = true;
                    break;
                }
            }

            if !toggled {
                evaluator.finish(&mut scan_diagnostics);
                diagnostics.extend(scan_diagnostics);
                break;
            }

            restarts += 1;
            if restarts >= MAX_KEYWORD_RESTARTS {
                log::warn!(
                    "#KEYWORDS block at line {} still toggling after {restarts} restarts, stopping",
                    block.first().map_or(0, |l| l.line_number)
                );
                break;
            }
        }
    }
    state
}

/// Inner lines of each `#KEYWORDS` ... `#END` block.
fn keyword_blocks(lines: &[TemplateLine]) -> Vec<&[TemplateLine]> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].text.starts_with("#KEYWORDS") {
            let start = i + 1;
            let end = lines[start..]
                .iter()
                .position(|l| l.text.trim() == END_MARKER)
                .map_or(lines.len(), |p| start + p);
            blocks.push(&lines[start..end]);
            i = end;
        }
        i += 1;
    }
    blocks
}
