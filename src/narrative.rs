use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::AnalyzerResult;
use crate::llm::{create_llm, ChatMessage, LlmConfig};
use crate::model::{Narrative, NarrativePhase, TranscriptSegment};

/// Hook never runs longer than this.
const MAX_HOOK_SECONDS: f64 = 3.0;
/// Hook never shorter than this (when the video itself is longer).
const MIN_HOOK_SECONDS: f64 = 0.5;
/// Payoff occupies at most the last quarter.
const PAYOFF_FRACTION: f64 = 0.75;
/// Phase descriptions are truncated to this many characters.
const MAX_DESCRIPTION_CHARS: usize = 220;
const MAX_THEMES: usize = 6;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "all", "can", "had", "her", "was",
    "one", "our", "out", "get", "has", "him", "his", "how", "its", "new", "now", "old", "see",
    "two", "way", "who", "did", "yes", "they", "them", "then", "this", "that", "with", "have",
    "from", "just", "like", "what", "when", "will", "were", "been", "some", "into", "about",
    "going", "gonna", "really", "very",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeMode {
    Heuristic,
    Llm,
}

impl FromStr for NarrativeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            other => Err(format!(
                "unknown narrative mode '{}' (expected heuristic|llm)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NarrativeOutcome {
    pub narrative: Narrative,
    pub technique: String,
    pub notes: Vec<String>,
}

/// Heuristic or LLM-assisted hook/escalation/payoff inference.
#[derive(Debug, Clone)]
pub struct NarrativeModule {
    pub mode: NarrativeMode,
    pub llm_config: LlmConfig,
}

impl Default for NarrativeModule {
    fn default() -> Self {
        Self {
            mode: NarrativeMode::Heuristic,
            llm_config: LlmConfig::default(),
        }
    }
}

impl NarrativeModule {
    pub async fn analyze(
        &self,
        duration: f64,
        first_cut: Option<f64>,
        transcript: &[TranscriptSegment],
        ocr_texts: &[String],
    ) -> AnalyzerResult<NarrativeOutcome> {
        let mut notes = Vec::new();

        let (mut narrative, technique) = if self.mode == NarrativeMode::Llm {
            match self.infer_with_llm(duration, transcript).await {
                Ok(n) => (n, "llm".to_string()),
                Err(e) => {
                    warn!("LLM narrative inference failed, using heuristic: {}", e);
                    notes.push(format!("narrative: llm failed ({}), heuristic fallback", e));
                    (
                        heuristic_narrative(duration, first_cut, transcript),
                        "heuristic".to_string(),
                    )
                }
            }
        } else {
            (
                heuristic_narrative(duration, first_cut, transcript),
                "heuristic".to_string(),
            )
        };

        narrative.themes = extract_themes(transcript);
        narrative.call_to_action = detect_cta(transcript, ocr_texts);

        info!(
            "📖 Narrative via {}: {} themes, cta={:?}",
            technique,
            narrative.themes.len(),
            narrative.call_to_action
        );

        Ok(NarrativeOutcome {
            narrative,
            technique,
            notes,
        })
    }

    /// Strict-JSON three-phase extraction through the chat collaborator.
    /// Phase boundaries are repaired into contiguity; anything else wrong
    /// (non-JSON, bad ordering, call failure) falls back to the heuristic.
    async fn infer_with_llm(
        &self,
        duration: f64,
        transcript: &[TranscriptSegment],
    ) -> anyhow::Result<Narrative> {
        #[derive(Debug, Deserialize)]
        struct LlmPhase {
            end: f64,
            description: String,
        }
        #[derive(Debug, Deserialize)]
        struct LlmArc {
            hook: LlmPhase,
            escalation: LlmPhase,
            payoff: LlmPhase,
        }

        let llm = create_llm(&self.llm_config)?;

        let transcript_text = transcript
            .iter()
            .map(|s| format!("[{:.1}-{:.1}] {}", s.start, s.end, s.text))
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You segment short-form videos into a three-phase narrative arc. \
            Respond with strict JSON only, shaped as \
            {\"hook\":{\"end\":<sec>,\"description\":<str>},\
            \"escalation\":{\"end\":<sec>,\"description\":<str>},\
            \"payoff\":{\"end\":<sec>,\"description\":<str>}}.";
        let user = format!(
            "Video duration: {:.2}s.\nTranscript:\n{}",
            duration,
            if transcript_text.is_empty() {
                "(none)".to_string()
            } else {
                transcript_text
            }
        );

        let response = llm
            .chat(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await?;

        let arc: LlmArc = serde_json::from_str(response.content.trim())?;

        let hook_end = arc.hook.end.clamp(0.0, duration);
        let escalation_end = arc.escalation.end.clamp(hook_end, duration);
        if arc.payoff.end < escalation_end {
            anyhow::bail!("phase boundaries out of order");
        }

        Ok(Narrative {
            hook: Some(NarrativePhase {
                start: 0.0,
                end: hook_end,
                description: truncate(&arc.hook.description),
            }),
            escalation: Some(NarrativePhase {
                start: hook_end,
                end: escalation_end,
                description: truncate(&arc.escalation.description),
            }),
            payoff: Some(NarrativePhase {
                start: escalation_end,
                end: duration,
                description: truncate(&arc.payoff.description),
            }),
            themes: Vec::new(),
            call_to_action: None,
        })
    }
}

/// Phase boundaries: hook ends at the first shot boundary or 20% of the
/// video, capped at 3s; payoff takes the final quarter; escalation fills
/// the gap.
pub fn heuristic_narrative(
    duration: f64,
    first_cut: Option<f64>,
    transcript: &[TranscriptSegment],
) -> Narrative {
    if duration <= 0.0 {
        return Narrative::default();
    }

    let mut hook_end = first_cut
        .filter(|&c| c > 0.0 && c < duration)
        .unwrap_or(duration * 0.2)
        .min(MAX_HOOK_SECONDS);
    if duration >= MIN_HOOK_SECONDS {
        hook_end = hook_end.max(MIN_HOOK_SECONDS);
    }
    hook_end = hook_end.min(duration);

    let payoff_start = (duration * PAYOFF_FRACTION).max(hook_end);

    Narrative {
        hook: Some(NarrativePhase {
            start: 0.0,
            end: hook_end,
            description: phase_description(0.0, hook_end, transcript, "attention-grabbing opening"),
        }),
        escalation: Some(NarrativePhase {
            start: hook_end,
            end: payoff_start,
            description: phase_description(
                hook_end,
                payoff_start,
                transcript,
                "builds on the opening",
            ),
        }),
        payoff: Some(NarrativePhase {
            start: payoff_start,
            end: duration,
            description: phase_description(payoff_start, duration, transcript, "closing payoff"),
        }),
        themes: Vec::new(),
        call_to_action: None,
    }
}

/// Concatenated transcript text overlapping `[start, end)`, truncated;
/// generic phrase when nothing overlaps.
fn phase_description(
    start: f64,
    end: f64,
    transcript: &[TranscriptSegment],
    fallback: &str,
) -> String {
    let text = transcript
        .iter()
        .filter(|s| s.start < end && start < s.end)
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        fallback.to_string()
    } else {
        truncate(&text)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Top tokens by frequency: lowercase alphanumeric words of 3+ chars,
/// stopwords dropped, ties broken alphabetically for determinism.
pub fn extract_themes(transcript: &[TranscriptSegment]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for segment in transcript {
        for token in segment
            .text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
        {
            if token.len() < 3 || STOPWORDS.contains(&token) {
                continue;
            }
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_THEMES).map(|(t, _)| t).collect()
}

/// First call-to-action phrase found across transcript and OCR text.
pub fn detect_cta(transcript: &[TranscriptSegment], ocr_texts: &[String]) -> Option<String> {
    let re = Regex::new(r"(?i)\b(follow|subscribe|like and subscribe|link in bio|comment|share)\b")
        .expect("static regex");

    transcript
        .iter()
        .map(|s| s.text.as_str())
        .chain(ocr_texts.iter().map(String::as_str))
        .find_map(|text| re.find(text).map(|m| m.as_str().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            speaker: None,
            text: text.to_string(),
            confidence: None,
        }
    }

    fn phases(n: &Narrative) -> (NarrativePhase, NarrativePhase, NarrativePhase) {
        (
            n.hook.clone().unwrap(),
            n.escalation.clone().unwrap(),
            n.payoff.clone().unwrap(),
        )
    }

    #[test]
    fn phases_are_contiguous_and_cover_duration() {
        let n = heuristic_narrative(20.0, Some(2.0), &[]);
        let (hook, esc, payoff) = phases(&n);
        assert_eq!(hook.start, 0.0);
        assert_eq!(hook.end, esc.start);
        assert_eq!(esc.end, payoff.start);
        assert_eq!(payoff.end, 20.0);
    }

    #[test]
    fn hook_capped_at_three_seconds() {
        let n = heuristic_narrative(60.0, Some(10.0), &[]);
        assert_eq!(n.hook.unwrap().end, 3.0);
    }

    #[test]
    fn hook_uses_first_cut_when_early() {
        let n = heuristic_narrative(20.0, Some(1.2), &[]);
        assert_eq!(n.hook.unwrap().end, 1.2);
    }

    #[test]
    fn hook_defaults_to_fifth_of_duration_without_cuts() {
        let n = heuristic_narrative(10.0, None, &[]);
        assert_eq!(n.hook.unwrap().end, 2.0);
    }

    #[test]
    fn hook_floored_at_half_second() {
        let n = heuristic_narrative(5.0, Some(0.1), &[]);
        assert_eq!(n.hook.unwrap().end, 0.5);
    }

    #[test]
    fn very_short_video_still_valid() {
        let n = heuristic_narrative(0.3, None, &[]);
        let (hook, _, payoff) = phases(&n);
        assert!(hook.end <= 0.3);
        assert_eq!(payoff.end, 0.3);
    }

    #[test]
    fn descriptions_come_from_overlapping_transcript() {
        let transcript = vec![
            seg(0.0, 2.0, "watch this incredible trick"),
            seg(5.0, 8.0, "here is how it works"),
        ];
        let n = heuristic_narrative(20.0, Some(2.5), &transcript);
        let (hook, esc, _) = phases(&n);
        assert!(hook.description.contains("incredible trick"));
        assert!(esc.description.contains("how it works"));
    }

    #[test]
    fn empty_transcript_uses_generic_descriptions() {
        let n = heuristic_narrative(10.0, None, &[]);
        assert_eq!(n.hook.unwrap().description, "attention-grabbing opening");
    }

    #[test]
    fn description_truncated_to_limit() {
        let long = "word ".repeat(100);
        let transcript = vec![seg(0.0, 3.0, &long)];
        let n = heuristic_narrative(10.0, None, &transcript);
        assert!(n.hook.unwrap().description.chars().count() <= MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn themes_ranked_by_frequency() {
        let transcript = vec![
            seg(0.0, 2.0, "pasta pasta pasta sauce sauce garlic"),
            seg(2.0, 4.0, "the and for you"),
        ];
        let themes = extract_themes(&transcript);
        assert_eq!(themes[0], "pasta");
        assert_eq!(themes[1], "sauce");
        assert!(themes.contains(&"garlic".to_string()));
        assert!(!themes.contains(&"the".to_string()));
    }

    #[test]
    fn short_tokens_dropped_from_themes() {
        let transcript = vec![seg(0.0, 1.0, "go go go ab cd")];
        assert!(extract_themes(&transcript).is_empty());
    }

    #[test]
    fn theme_count_capped_at_six() {
        let transcript = vec![seg(
            0.0,
            5.0,
            "alpha bravo charlie delta echo foxtrot golf hotel",
        )];
        assert_eq!(extract_themes(&transcript).len(), 6);
    }

    #[test]
    fn cta_found_in_transcript() {
        let transcript = vec![seg(0.0, 2.0, "don't forget to SUBSCRIBE for more")];
        assert_eq!(detect_cta(&transcript, &[]), Some("subscribe".to_string()));
    }

    #[test]
    fn cta_found_in_ocr_text() {
        let texts = vec!["LINK IN BIO".to_string()];
        assert_eq!(detect_cta(&[], &texts), Some("link in bio".to_string()));
    }

    #[test]
    fn no_cta_is_none() {
        let transcript = vec![seg(0.0, 2.0, "just a normal sentence")];
        assert_eq!(detect_cta(&transcript, &[]), None);
    }

    #[test]
    fn narrative_mode_parses() {
        assert_eq!(
            "heuristic".parse::<NarrativeMode>().unwrap(),
            NarrativeMode::Heuristic
        );
        assert_eq!("llm".parse::<NarrativeMode>().unwrap(), NarrativeMode::Llm);
        assert!("magic".parse::<NarrativeMode>().is_err());
    }
}
