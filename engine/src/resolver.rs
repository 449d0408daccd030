//! Maps free text to at most one activity in the active routine.
//!
//! Rules are tried in order: keyword overlap, fuzzy similarity, deictic
//! reference, single-in-progress fallback. Resolution is case-insensitive,
//! trim-insensitive, and deterministic — identical inputs always resolve to
//! the same activity.

use serde::{Deserialize, Serialize};

use sprout_core::routine::{ActivityBrief, ActivityStatus, RoutineSnapshot};

use crate::config::EngineConfig;

/// Activity-name words must be strictly longer than this to count as
/// keywords ("up", "the" and friends carry no signal).
const KEYWORD_MIN_CHARS: usize = 3;
/// Messages up to this many words get word-by-word similarity on top of the
/// whole-phrase comparison.
const SHORT_PHRASE_MAX_WORDS: usize = 4;
/// Fuzzy scores within this band of the best are near-equal; the tie breaks
/// toward the earliest pending activity.
const SCORE_TIE_BAND: f64 = 0.05;
/// Words that point at "whatever we're doing right now".
const REFERENCE_WORDS: &[&str] = &["this", "that", "it", "now"];

/// Which resolver rule produced a match, in ladder order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Keyword,
    Fuzzy,
    Deictic,
    OnlyActive,
}

/// A successful resolution: the activity's name, its fixed sequence
/// position, and which rule found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedActivity {
    pub name: String,
    pub position: usize,
    pub source: MatchSource,
}

/// Collapse whitespace and lowercase.
pub(crate) fn normalize_message(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
                .to_string()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Resolve `message` against the snapshot's ordered activity names.
///
/// `completion_detected` gates the two fallback rules: a deictic word or a
/// lone in-progress activity only resolves when the message already sounds
/// like a completion, so small talk never picks up an activity by accident.
pub fn resolve_activity(
    message: &str,
    snapshot: &RoutineSnapshot,
    completion_detected: bool,
    config: &EngineConfig,
) -> Option<ResolvedActivity> {
    let text = normalize_message(message);
    if text.is_empty() || snapshot.activities.is_empty() {
        return None;
    }
    let tokens = tokenize(&text);

    if let Some(found) = keyword_match(&text, &tokens, snapshot) {
        tracing::debug!(activity = %found.name, "resolved via keyword overlap");
        return Some(found);
    }
    if let Some(found) = fuzzy_match(&text, &tokens, snapshot, config) {
        tracing::debug!(activity = %found.name, "resolved via fuzzy similarity");
        return Some(found);
    }
    if completion_detected {
        if config.deictic_fallback_enabled {
            if let Some(found) = deictic_match(&tokens, snapshot) {
                tracing::debug!(activity = %found.name, "resolved via deictic reference");
                return Some(found);
            }
        }
        if let Some(found) = only_active_match(snapshot) {
            tracing::debug!(activity = %found.name, "resolved to the only in-progress activity");
            return Some(found);
        }
    }
    None
}

/// Rule 1: a candidate whose full name appears in the message, or whose
/// longer words overlap the message tokens.
fn keyword_match(
    text: &str,
    tokens: &[String],
    snapshot: &RoutineSnapshot,
) -> Option<ResolvedActivity> {
    let mut hits: Vec<&ActivityBrief> = Vec::new();
    for activity in &snapshot.activities {
        let name = normalize_message(&activity.name);
        if name.is_empty() {
            continue;
        }
        let whole = text.contains(&name);
        let overlap = name.split_whitespace().any(|word| {
            word.len() > KEYWORD_MIN_CHARS && tokens.iter().any(|token| token == word)
        });
        if whole || overlap {
            hits.push(activity);
        }
    }
    pick_earliest_pending(&hits).map(|activity| ResolvedActivity {
        name: activity.name.clone(),
        position: activity.position,
        source: MatchSource::Keyword,
    })
}

/// Rule 2: normalized similarity — whole message against each full name,
/// and word-by-word for short phrases. Highest score wins; near-equal
/// scores go to the earliest pending activity.
fn fuzzy_match(
    text: &str,
    tokens: &[String],
    snapshot: &RoutineSnapshot,
    config: &EngineConfig,
) -> Option<ResolvedActivity> {
    let mut scored: Vec<(&ActivityBrief, f64)> = Vec::new();
    for activity in &snapshot.activities {
        let name = normalize_message(&activity.name);
        if name.is_empty() {
            continue;
        }

        let mut best = 0.0_f64;
        let whole = strsim::normalized_levenshtein(text, &name);
        if whole >= config.whole_phrase_threshold {
            best = whole;
        }
        if tokens.len() <= SHORT_PHRASE_MAX_WORDS {
            for token in tokens {
                for word in name.split_whitespace() {
                    let similarity = strsim::jaro_winkler(token, word);
                    if similarity >= config.word_threshold && similarity > best {
                        best = similarity;
                    }
                }
            }
        }
        if best > 0.0 {
            scored.push((activity, best));
        }
    }

    if scored.is_empty() {
        return None;
    }
    let top = scored
        .iter()
        .map(|(_, score)| *score)
        .fold(f64::NEG_INFINITY, f64::max);
    let near: Vec<&ActivityBrief> = scored
        .iter()
        .filter(|(_, score)| *score >= top - SCORE_TIE_BAND)
        .map(|(activity, _)| *activity)
        .collect();
    pick_earliest_pending(&near).map(|activity| ResolvedActivity {
        name: activity.name.clone(),
        position: activity.position,
        source: MatchSource::Fuzzy,
    })
}

/// Rule 3: "I did it / this / that" resolves to whatever the pointer
/// designates, regardless of textual similarity. Deliberately recall-biased.
fn deictic_match(tokens: &[String], snapshot: &RoutineSnapshot) -> Option<ResolvedActivity> {
    let has_reference = tokens
        .iter()
        .any(|token| REFERENCE_WORDS.contains(&token.as_str()));
    if !has_reference {
        return None;
    }
    snapshot.current_activity().map(|activity| ResolvedActivity {
        name: activity.name.clone(),
        position: activity.position,
        source: MatchSource::Deictic,
    })
}

/// Rule 4: nothing matched, but exactly one activity is mid-flight.
fn only_active_match(snapshot: &RoutineSnapshot) -> Option<ResolvedActivity> {
    let mut in_progress = snapshot
        .activities
        .iter()
        .filter(|activity| activity.status == ActivityStatus::InProgress);
    let only = in_progress.next()?;
    if in_progress.next().is_some() {
        return None;
    }
    Some(ResolvedActivity {
        name: only.name.clone(),
        position: only.position,
        source: MatchSource::OnlyActive,
    })
}

/// Ambiguity policy: among candidates (already in sequence order), prefer
/// the earliest still-open one; if all are closed, take the earliest.
fn pick_earliest_pending<'a>(candidates: &[&'a ActivityBrief]) -> Option<&'a ActivityBrief> {
    candidates
        .iter()
        .find(|activity| activity.status.is_open())
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use sprout_core::routine::{ActivityBrief, ActivityStatus, RoutineSnapshot};
    use uuid::Uuid;

    use crate::config::EngineConfig;

    use super::{MatchSource, normalize_message, resolve_activity};

    fn snapshot(steps: &[(&str, ActivityStatus)], current: usize) -> RoutineSnapshot {
        RoutineSnapshot {
            routine_id: Uuid::now_v7(),
            name: "Morning Routine".to_string(),
            activities: steps
                .iter()
                .enumerate()
                .map(|(position, (name, status))| ActivityBrief {
                    name: name.to_string(),
                    status: *status,
                    position,
                })
                .collect(),
            current_activity_index: current,
        }
    }

    fn morning() -> RoutineSnapshot {
        snapshot(
            &[
                ("Wake Up", ActivityStatus::InProgress),
                ("Get Dressed", ActivityStatus::NotStarted),
                ("Eat Breakfast", ActivityStatus::NotStarted),
            ],
            0,
        )
    }

    #[test]
    fn normalization_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_message("  I   Woke Up "), "i woke up");
    }

    #[test]
    fn keyword_overlap_matches_longer_words() {
        let config = EngineConfig::default();
        let found = resolve_activity("time for breakfast now", &morning(), false, &config)
            .expect("breakfast should resolve");
        assert_eq!(found.name, "Eat Breakfast");
        assert_eq!(found.source, MatchSource::Keyword);
    }

    #[test]
    fn full_name_containment_matches() {
        let config = EngineConfig::default();
        let found = resolve_activity("I finished get dressed", &morning(), true, &config)
            .expect("full name should resolve");
        assert_eq!(found.name, "Get Dressed");
        assert_eq!(found.source, MatchSource::Keyword);
    }

    #[test]
    fn woke_up_resolves_to_wake_up_via_fuzzy() {
        let config = EngineConfig::default();
        let found = resolve_activity("I woke up", &morning(), true, &config)
            .expect("'I woke up' should resolve");
        assert_eq!(found.name, "Wake Up");
        assert_eq!(found.source, MatchSource::Fuzzy);
    }

    #[test]
    fn got_dressed_resolves_after_step_one_is_done() {
        let config = EngineConfig::default();
        let snap = snapshot(
            &[
                ("Wake Up", ActivityStatus::Completed),
                ("Get Dressed", ActivityStatus::InProgress),
                ("Eat Breakfast", ActivityStatus::NotStarted),
            ],
            1,
        );
        let found =
            resolve_activity("Got dressed", &snap, true, &config).expect("should resolve");
        assert_eq!(found.name, "Get Dressed");
    }

    #[test]
    fn deictic_reference_resolves_to_the_pointer_activity() {
        let config = EngineConfig::default();
        let found = resolve_activity("i did this", &morning(), true, &config)
            .expect("'this' should resolve to the current activity");
        // "did" alone resolves nothing textually; "this" points at the pointer.
        assert_eq!(found.name, "Wake Up");
        assert_eq!(found.source, MatchSource::Deictic);
    }

    #[test]
    fn deictic_fallback_can_be_disabled() {
        let config = EngineConfig {
            deictic_fallback_enabled: false,
            ..EngineConfig::default()
        };
        let found = resolve_activity("i did this", &morning(), true, &config)
            .expect("still resolves via the only in-progress fallback");
        assert_eq!(found.source, MatchSource::OnlyActive);
    }

    #[test]
    fn unmatched_completion_defaults_to_the_only_in_progress_activity() {
        let config = EngineConfig::default();
        let found = resolve_activity("i finished blorp", &morning(), true, &config)
            .expect("single in-progress activity should absorb it");
        assert_eq!(found.name, "Wake Up");
        assert_eq!(found.source, MatchSource::OnlyActive);
    }

    #[test]
    fn fallbacks_require_completion_evidence() {
        let config = EngineConfig::default();
        assert_eq!(
            resolve_activity("I like rainbows", &morning(), false, &config),
            None
        );
        assert_eq!(resolve_activity("it now", &morning(), false, &config), None);
    }

    #[test]
    fn nothing_in_progress_and_nothing_matching_resolves_nothing() {
        let config = EngineConfig::default();
        let snap = snapshot(
            &[
                ("Wake Up", ActivityStatus::NotStarted),
                ("Get Dressed", ActivityStatus::NotStarted),
            ],
            0,
        );
        assert_eq!(resolve_activity("i finished blorp", &snap, true, &config), None);
    }

    #[test]
    fn near_equal_scores_break_toward_the_earliest_pending() {
        let config = EngineConfig::default();
        let snap = snapshot(
            &[
                ("Brush Teeth", ActivityStatus::Completed),
                ("Brush Hair", ActivityStatus::InProgress),
            ],
            1,
        );
        // "brush" overlaps both names; the completed one loses the tie.
        let found =
            resolve_activity("i brushed my brush", &snap, true, &config).expect("should resolve");
        assert_eq!(found.name, "Brush Hair");
    }

    #[test]
    fn resolution_is_deterministic() {
        let config = EngineConfig::default();
        let first = resolve_activity("I woke up", &morning(), true, &config);
        let second = resolve_activity("I woke up", &morning(), true, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_inputs_resolve_nothing() {
        let config = EngineConfig::default();
        assert_eq!(resolve_activity("   ", &morning(), true, &config), None);
        let empty = snapshot(&[], 0);
        assert_eq!(resolve_activity("I woke up", &empty, true, &config), None);
    }
}
