//! Intent classification for inbound chat messages. Pattern tables are data:
//! adding a phrase or regex extends detection without new code paths.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolver::normalize_message;

const HIGH_CONFIDENCE_MIN: f64 = 0.85;
const MEDIUM_CONFIDENCE_MIN: f64 = 0.6;

/// Confidence added when the resolver produced a concrete activity.
const RESOLUTION_BOOST: f64 = 0.25;
/// Confidence added when the resolution came from direct keyword overlap.
const KEYWORD_BOOST: f64 = 0.15;

/// Classified purpose of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CompleteActivity,
    StartRoutine,
    ActivityInquiry,
    GeneralChat,
}

/// One intent category and the textual signals that vote for it.
pub(crate) struct IntentRule {
    pub intent: Intent,
    /// Literal phrases, matched by containment on the normalized message.
    pub phrases: &'static [&'static str],
    /// Compiled patterns, matched against the normalized message.
    pub patterns: &'static LazyLock<Vec<Regex>>,
    /// Confidence contribution of an explicit phrase or pattern hit.
    pub weight: f64,
}

const COMPLETION_PHRASES: &[&str] = &[
    "i'm done",
    "im done",
    "all done",
    "i did it",
    "i finished",
    "just finished",
    "finished it",
    "completed",
];

const START_PHRASES: &[&str] = &[
    "let's start",
    "lets start",
    "start my",
    "begin my",
    "time to start",
    "let's do",
    "lets do",
    "ready to start",
];

// Messages are normalized (lowercased, whitespace-collapsed) before matching,
// so the patterns stay lower-case.
static COMPLETION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bi (just )?woke up\b",
        r"\bi (just )?got (up|dressed|ready|washed)\b",
        r"\bi('m| am) (all )?(done|finished)\b",
        r"\bi (just )?(brushed|washed|combed|cleaned|ate|drank|made|packed|tidied|took|read|did|put) (my |the |some )?\w+",
        r"\b(all )?(done|finished) with\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid completion pattern"))
    .collect()
});

static START_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(start|begin|do) (my |our |the )?(\w+ )?(routine|activities)\b",
        r"\b(ready|time) to (start|begin|do)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid start pattern"))
    .collect()
});

static COMPLETION_RULE: IntentRule = IntentRule {
    intent: Intent::CompleteActivity,
    phrases: COMPLETION_PHRASES,
    patterns: &COMPLETION_PATTERNS,
    weight: 0.3,
};

static START_RULE: IntentRule = IntentRule {
    intent: Intent::StartRoutine,
    phrases: START_PHRASES,
    patterns: &START_PATTERNS,
    weight: 0.3,
};

pub(crate) fn rules() -> [&'static IntentRule; 2] {
    [&COMPLETION_RULE, &START_RULE]
}

/// Irregular past-tense forms a young child actually uses. The regular
/// "-ed" suffix is handled by the heuristic below.
const IRREGULAR_PAST: &[&str] = &[
    "woke", "ate", "got", "made", "did", "took", "went", "put", "read", "drank", "slept", "came",
    "ran", "sat", "stood",
];

/// Which kind of evidence flagged a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// A phrase from the completion list appeared verbatim.
    Phrase,
    /// A verb+object pattern matched.
    Pattern,
    /// Generic past-tense heuristic only.
    PastTense,
}

/// Strongest completion evidence in the message, if any.
pub fn completion_signal(message: &str) -> Option<CompletionSignal> {
    let text = normalize_message(message);
    if text.is_empty() {
        return None;
    }
    if COMPLETION_RULE
        .phrases
        .iter()
        .any(|phrase| text.contains(phrase))
    {
        return Some(CompletionSignal::Phrase);
    }
    if COMPLETION_RULE
        .patterns
        .iter()
        .any(|pattern| pattern.is_match(&text))
    {
        return Some(CompletionSignal::Pattern);
    }
    if looks_past_tense(&text) {
        return Some(CompletionSignal::PastTense);
    }
    None
}

/// Does the message signal that an activity was completed?
pub fn detect_completion_intent(message: &str) -> bool {
    completion_signal(message).is_some()
}

/// Does the message ask to start a routine?
pub fn detect_start_intent(message: &str) -> bool {
    let text = normalize_message(message);
    if text.is_empty() {
        return false;
    }
    START_RULE.phrases.iter().any(|phrase| text.contains(phrase))
        || START_RULE
            .patterns
            .iter()
            .any(|pattern| pattern.is_match(&text))
}

fn looks_past_tense(text: &str) -> bool {
    text.split_whitespace().any(|word| {
        let word = word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '\'');
        IRREGULAR_PAST.contains(&word) || (word.len() > 4 && word.ends_with("ed"))
    })
}

/// Final intent decision. Completion evidence wins whenever an activity
/// resolved or an active routine is there to absorb it; a start phrase comes
/// next; a resolved activity without completion language is an inquiry.
pub fn determine_intent(
    message: &str,
    completion_detected: bool,
    extracted_activity: Option<&str>,
    has_active_routine: bool,
) -> Intent {
    if completion_detected && extracted_activity.is_some() {
        return Intent::CompleteActivity;
    }
    if completion_detected && has_active_routine {
        return Intent::CompleteActivity;
    }
    if detect_start_intent(message) {
        return Intent::StartRoutine;
    }
    if extracted_activity.is_some() && has_active_routine {
        return Intent::ActivityInquiry;
    }
    Intent::GeneralChat
}

/// Corroborating evidence feeding the confidence score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceSignals {
    /// An explicit phrase or pattern hit — not just the past-tense heuristic.
    pub explicit_phrase: bool,
    /// The resolver produced a concrete activity.
    pub resolved_activity: bool,
    /// That resolution came from direct keyword overlap.
    pub strong_keyword: bool,
}

/// Score in [0, 1]: base plus one increment per corroborating signal,
/// capped at 1. Monotonic — adding a signal never lowers the score.
pub fn calculate_confidence(intent: Intent, signals: ConfidenceSignals, base: f64) -> f64 {
    let mut score = base;
    if signals.explicit_phrase {
        if let Some(rule) = rules().into_iter().find(|rule| rule.intent == intent) {
            score += rule.weight;
        }
    }
    if signals.resolved_activity {
        score += RESOLUTION_BOOST;
    }
    if signals.strong_keyword {
        score += KEYWORD_BOOST;
    }
    score.min(1.0)
}

/// Coarse bucket the conversational layer keys its phrasing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

pub fn confidence_band(score: f64) -> ConfidenceBand {
    if score >= HIGH_CONFIDENCE_MIN {
        ConfidenceBand::High
    } else if score >= MEDIUM_CONFIDENCE_MIN {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    }
}
