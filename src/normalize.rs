//! Activity label cleaning.
//!
//! Labels exported from process models carry a structural ID in front of the
//! human readable text ("6 SZ - XX - 01 - Approve invoice", "J11 Confirm order",
//! "8.5.1.3 Release payment"). Cleaning removes that ID:
//!
//! 1. Try each [`PrefixClass`] in priority order against the start of the label
//! 2. Remove the span of the first class that matches (at most one removal)
//! 3. Trim surrounding whitespace
//!
//! Cleaning only ever deletes characters and never fails.

use once_cell::sync::Lazy;
use regex::Regex;

/// Known ID prefix conventions, in matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixClass {
    /// `6 SZ - XX - 01 -`
    StepAreaCode,
    /// `EWM -`
    ModuleDash,
    /// `(2 F2)`
    ParenCode,
    /// `2 T3:`
    StepColon,
    /// `(2 F) –`, `12AB –`
    CodeDash,
    /// `1 J2 –`
    StepCodeDash,
    /// `5 XU`, `2 VM –`
    StepLetters,
    /// `J11 –`
    CodeNumberDash,
    /// `J11`
    CodeNumber,
    /// `22 T –`
    NumberLettersDash,
    /// `BDN –`
    LettersDash,
    /// `BJK - XX -`
    LettersPairDash,
    /// `2 –`, `04 –`
    NumberDash,
    /// `8.5.1.3`
    DottedNumber,
    /// `MFS-50-10-30`
    DashedCode,
    /// `XX – 01 –`
    PairNumberDash,
}

impl PrefixClass {
    pub const ALL: [PrefixClass; 16] = [
        PrefixClass::StepAreaCode,
        PrefixClass::ModuleDash,
        PrefixClass::ParenCode,
        PrefixClass::StepColon,
        PrefixClass::CodeDash,
        PrefixClass::StepCodeDash,
        PrefixClass::StepLetters,
        PrefixClass::CodeNumberDash,
        PrefixClass::CodeNumber,
        PrefixClass::NumberLettersDash,
        PrefixClass::LettersDash,
        PrefixClass::LettersPairDash,
        PrefixClass::NumberDash,
        PrefixClass::DottedNumber,
        PrefixClass::DashedCode,
        PrefixClass::PairNumberDash,
    ];

    /// Priority rank, 1 is tried first.
    pub fn rank(self) -> usize {
        Self::ALL
            .iter()
            .position(|class| *class == self)
            .map(|idx| idx + 1)
            .unwrap_or(usize::MAX)
    }

    /// Anchored pattern. Hyphen, en-dash and em-dash are interchangeable.
    fn pattern(self) -> &'static str {
        match self {
            PrefixClass::StepAreaCode => {
                r"^\d\s+[A-Z]{2}\s+[-–—]\s+[A-Z]{2}\s+[-–—]\s+\d{2}\s+[-–—]\s+"
            }
            PrefixClass::ModuleDash => r"^[A-Z]+\s+[-–—]\s+",
            PrefixClass::ParenCode => r"^\(\d+\s+[A-Z]+\d*\)\s*",
            PrefixClass::StepColon => r"^\d\s+[A-Z]\d:\s*",
            PrefixClass::CodeDash => r"^\(?\d+\s?[A-Z]+\)?\s*[-–—]+\s*",
            PrefixClass::StepCodeDash => r"^\d\s+[A-Z]\d\s*[-–—]+\s*",
            PrefixClass::StepLetters => r"^\d\s+[A-Z]{2,}\s*[-–—]*\s*",
            PrefixClass::CodeNumberDash => r"^[A-Z]+\d+\s*[-–—]+\s+",
            PrefixClass::CodeNumber => r"^[A-Z]+\d+\s*",
            PrefixClass::NumberLettersDash => r"^\d+\s*[A-Z]+\s*[-–—]+\s+",
            PrefixClass::LettersDash => r"^[A-Z]{2,}\s*[-–—]+\s+",
            PrefixClass::LettersPairDash => r"^[A-Z]+\s*[-–—]\s*[A-Z]{2}\s*[-–—]\s+",
            PrefixClass::NumberDash => r"^\d{1,2}\s*[-–—]+\s+",
            PrefixClass::DottedNumber => r"^\d+(?:\.\d+)+\s+",
            // the trailing boundary is checked in `PrefixMatcher::match_len`
            PrefixClass::DashedCode => r"^[A-Z]+[-–—]\d+(?:[-–—]\d+)+",
            PrefixClass::PairNumberDash => r"^[A-Z]{2}\s*[-–—]\s*\d{2}\s*[-–—]\s+",
        }
    }
}

/// Result of matching a label against the prefix classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatch {
    pub class: PrefixClass,
    /// Byte length of the matched span, starting at 0.
    pub len: usize,
}

struct PrefixMatcher {
    class: PrefixClass,
    regex: Regex,
}

impl PrefixMatcher {
    fn new(class: PrefixClass) -> Self {
        let regex = Regex::new(class.pattern()).expect("malformed prefix pattern");
        Self { class, regex }
    }

    fn match_len(&self, label: &str) -> Option<usize> {
        let found = self.regex.find(label)?;
        let end = found.end();

        if self.class != PrefixClass::DashedCode {
            return Some(end);
        }

        // a dashed code must be followed by whitespace (consumed) or run
        // straight into an uppercase word (kept)
        let rest = &label[end..];
        let whitespace = rest.len() - rest.trim_start().len();
        if whitespace > 0 {
            Some(end + whitespace)
        } else if rest.starts_with(|c: char| c.is_ascii_uppercase()) {
            Some(end)
        } else {
            None
        }
    }
}

static MATCHERS: Lazy<Vec<PrefixMatcher>> =
    Lazy::new(|| PrefixClass::ALL.iter().map(|c| PrefixMatcher::new(*c)).collect());

/// Find the highest priority ID prefix at the start of `label`.
pub fn match_prefix(label: &str) -> Option<PrefixMatch> {
    MATCHERS.iter().find_map(|matcher| {
        matcher.match_len(label).map(|len| PrefixMatch {
            class: matcher.class,
            len,
        })
    })
}

/// Strip the leading structural ID from a raw activity label.
///
/// Only the first matching prefix is removed; the remainder is trimmed.
/// The result may be empty when the whole label was an ID.
pub fn clean_label(label: &str) -> String {
    let rest = match match_prefix(label) {
        Some(found) => &label[found.len..],
        None => label,
    };

    rest.trim().to_string()
}
