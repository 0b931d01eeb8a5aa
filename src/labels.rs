// src/labels.rs
// Swahili warning banners prepended to delivered messages.

use serde::Serialize;

use crate::models::Decision;

/// Rendering context of a banner. All styles are keyed by the same decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelStyle {
    /// Default banner used for SMS delivery.
    #[default]
    Standard,
    /// Space-constrained contexts.
    Compact,
    /// Official communications.
    Formal,
}

const WARNING_STANDARD: &str = "⚠️ Tahadhari: Epuka Matapeli";
const BLOCKED_STANDARD: &str = "🚫 Imezuiliwa: SPAM";

const WARNING_COMPACT: &str = "⚠️ Epuka Matapeli";
const BLOCKED_COMPACT: &str = "🚫 SPAM";

const WARNING_FORMAL: &str =
    "Tahadhari: Ujumbe huu unaweza kuwa ni ulaghai. Epuka kutoa maelezo ya kibinafsi au fedha.";
const BLOCKED_FORMAL: &str =
    "Ujumbe huu umezuiliwa kwa sababu ni SPAM. Usijibu au usiingiliane na ujumbe huu.";

/// Banner for `decision` in `style`. Empty for CLEAN.
pub fn label(decision: Decision, style: LabelStyle) -> &'static str {
    match (decision, style) {
        (Decision::Clean, _) => "",
        (Decision::ContentWarning | Decision::SenderWarning, LabelStyle::Standard) => {
            WARNING_STANDARD
        }
        (Decision::ContentWarning | Decision::SenderWarning, LabelStyle::Compact) => {
            WARNING_COMPACT
        }
        (Decision::ContentWarning | Decision::SenderWarning, LabelStyle::Formal) => WARNING_FORMAL,
        (Decision::Blocked, LabelStyle::Standard) => BLOCKED_STANDARD,
        (Decision::Blocked, LabelStyle::Compact) => BLOCKED_COMPACT,
        (Decision::Blocked, LabelStyle::Formal) => BLOCKED_FORMAL,
    }
}

pub fn english_translation(decision: Decision) -> &'static str {
    match decision {
        Decision::Clean => "Clean",
        Decision::ContentWarning | Decision::SenderWarning => "Warning: Avoid Fraud/Scams",
        Decision::Blocked => "Blocked: SPAM",
    }
}

/// Standard banner + blank line + original text. CLEAN text is returned as is.
pub fn apply_label(text: &str, decision: Decision) -> String {
    apply_label_with(text, decision, LabelStyle::Standard)
}

pub fn apply_label_with(text: &str, decision: Decision, style: LabelStyle) -> String {
    let banner = label(decision, style);
    if banner.is_empty() {
        text.to_string()
    } else {
        format!("{banner}\n\n{text}")
    }
}

pub fn should_block(decision: Decision) -> bool {
    decision == Decision::Blocked
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelInfo {
    pub label: &'static str,
    pub english_translation: &'static str,
    pub has_label: bool,
    pub decision: Decision,
}

pub fn label_info(decision: Decision) -> LabelInfo {
    let l = label(decision, LabelStyle::Standard);
    LabelInfo {
        label: l,
        english_translation: english_translation(decision),
        has_label: !l.is_empty(),
        decision,
    }
}
