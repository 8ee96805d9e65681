//! Lexicon-based sentiment scoring for financial headlines.
//!
//! Pure function from text to a bounded compound score in [-1, 1]. The
//! lexicon is a small finance-tuned valence table; scoring applies a
//! negation window and intensity boosters, then squashes the summed valence
//! with `s / sqrt(s^2 + 15)`.
//!
//! The analyzer is cheap to build but is typically shared process-wide via
//! [`SentimentAnalyzer::shared`], which initializes exactly once; the first
//! caller wins and later callers reuse the same handle.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Valence table: word -> raw valence in roughly [-4, 4].
///
/// Tuned for market news; general words carry their conventional polarity,
/// finance terms carry the polarity they signal about the subject company.
const LEXICON: &[(&str, f64)] = &[
    // Positive market language
    ("gain", 1.8),
    ("gains", 1.8),
    ("gained", 1.8),
    ("rally", 2.1),
    ("rallies", 2.1),
    ("surge", 2.4),
    ("surges", 2.4),
    ("surged", 2.4),
    ("soar", 2.6),
    ("soars", 2.6),
    ("soared", 2.6),
    ("jump", 1.9),
    ("jumps", 1.9),
    ("jumped", 1.9),
    ("rise", 1.5),
    ("rises", 1.5),
    ("rose", 1.5),
    ("climb", 1.6),
    ("climbs", 1.6),
    ("climbed", 1.6),
    ("rebound", 1.7),
    ("rebounds", 1.7),
    ("recover", 1.6),
    ("recovery", 1.6),
    ("beat", 1.9),
    ("beats", 1.9),
    ("outperform", 2.0),
    ("outperforms", 2.0),
    ("upgrade", 2.0),
    ("upgraded", 2.0),
    ("record", 1.4),
    ("profit", 1.7),
    ("profits", 1.7),
    ("profitable", 1.8),
    ("growth", 1.6),
    ("grows", 1.4),
    ("strong", 1.5),
    ("strength", 1.4),
    ("bullish", 2.2),
    ("boom", 2.0),
    ("win", 1.7),
    ("wins", 1.7),
    ("won", 1.7),
    ("positive", 1.6),
    ("optimistic", 1.8),
    ("upbeat", 1.7),
    ("success", 1.8),
    ("successful", 1.8),
    ("expand", 1.3),
    ("expands", 1.3),
    ("expansion", 1.3),
    ("dividend", 1.1),
    ("buyback", 1.2),
    ("approve", 1.2),
    ("approved", 1.2),
    ("good", 1.5),
    ("great", 2.0),
    ("best", 2.2),
    ("top", 1.2),
    ("high", 1.0),
    ("higher", 1.2),
    // Negative market language
    ("loss", -1.8),
    ("losses", -1.8),
    ("lose", -1.6),
    ("loses", -1.6),
    ("lost", -1.6),
    ("fall", -1.5),
    ("falls", -1.5),
    ("fell", -1.5),
    ("drop", -1.6),
    ("drops", -1.6),
    ("dropped", -1.6),
    ("slump", -2.1),
    ("slumps", -2.1),
    ("plunge", -2.5),
    ("plunges", -2.5),
    ("plunged", -2.5),
    ("crash", -2.8),
    ("crashes", -2.8),
    ("tumble", -2.2),
    ("tumbles", -2.2),
    ("tumbled", -2.2),
    ("sink", -1.9),
    ("sinks", -1.9),
    ("sank", -1.9),
    ("decline", -1.5),
    ("declines", -1.5),
    ("declined", -1.5),
    ("miss", -1.7),
    ("misses", -1.7),
    ("missed", -1.7),
    ("underperform", -2.0),
    ("downgrade", -2.0),
    ("downgraded", -2.0),
    ("bearish", -2.2),
    ("weak", -1.5),
    ("weakness", -1.5),
    ("slowdown", -1.6),
    ("recession", -2.3),
    ("debt", -1.2),
    ("default", -2.4),
    ("fraud", -3.0),
    ("scandal", -2.6),
    ("probe", -1.4),
    ("investigation", -1.4),
    ("lawsuit", -1.8),
    ("fine", -1.3),
    ("fined", -1.5),
    ("penalty", -1.5),
    ("layoff", -2.0),
    ("layoffs", -2.0),
    ("cut", -1.1),
    ("cuts", -1.1),
    ("warn", -1.6),
    ("warns", -1.6),
    ("warning", -1.6),
    ("risk", -1.1),
    ("risks", -1.1),
    ("fear", -1.8),
    ("fears", -1.8),
    ("concern", -1.3),
    ("concerns", -1.3),
    ("negative", -1.6),
    ("pessimistic", -1.8),
    ("bad", -1.5),
    ("worst", -2.4),
    ("low", -1.0),
    ("lower", -1.2),
    ("bankrupt", -3.1),
    ("bankruptcy", -3.1),
];

/// Words that invert the valence of a nearby lexicon hit.
const NEGATORS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "isn", "wasn", "aren", "weren", "don", "doesn",
    "didn", "wouldn", "couldn", "shouldn", "cannot", "without", "hardly",
];

/// Intensity modifiers: added to (or subtracted from) a hit's magnitude.
const BOOSTERS: &[(&str, f64)] = &[
    ("very", 0.293),
    ("extremely", 0.293),
    ("hugely", 0.293),
    ("sharply", 0.293),
    ("massively", 0.293),
    ("significantly", 0.293),
    ("strongly", 0.293),
    ("slightly", -0.293),
    ("marginally", -0.293),
    ("somewhat", -0.293),
    ("barely", -0.293),
];

/// How many preceding tokens are inspected for negators and boosters.
const CONTEXT_WINDOW: usize = 3;

/// Dampening applied when a hit is negated.
const NEGATION_SCALAR: f64 = -0.74;

/// Shared lexicon handle built once per process.
static SHARED: OnceLock<SentimentAnalyzer> = OnceLock::new();

/// Lexicon-based sentiment analyzer.
pub struct SentimentAnalyzer {
    lexicon: HashMap<&'static str, f64>,
    boosters: HashMap<&'static str, f64>,
}

impl SentimentAnalyzer {
    /// Build an owned analyzer. Prefer [`SentimentAnalyzer::shared`] in
    /// long-running services.
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.iter().copied().collect(),
            boosters: BOOSTERS.iter().copied().collect(),
        }
    }

    /// Process-wide analyzer, initialized on first use. Safe to call from
    /// concurrent threads; all callers get the same handle.
    pub fn shared() -> &'static SentimentAnalyzer {
        SHARED.get_or_init(SentimentAnalyzer::new)
    }

    /// Compound sentiment score for `text`, bounded to [-1, 1].
    ///
    /// Empty or whitespace-only text scores exactly 0.0, a defined case
    /// rather than an error.
    pub fn score(&self, text: &str) -> f64 {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        if tokens.is_empty() {
            return 0.0;
        }

        let mut total = 0.0;
        for (i, token) in tokens.iter().enumerate() {
            let Some(&valence) = self.lexicon.get(token.as_str()) else {
                continue;
            };

            let mut v = valence;
            let window_start = i.saturating_sub(CONTEXT_WINDOW);
            for prev in &tokens[window_start..i] {
                if let Some(&b) = self.boosters.get(prev.as_str()) {
                    v += if v >= 0.0 { b } else { -b };
                }
                if NEGATORS.contains(&prev.as_str()) {
                    v *= NEGATION_SCALAR;
                }
            }
            total += v;
        }

        normalize(total)
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Squash a raw valence sum into [-1, 1].
fn normalize(sum: f64) -> f64 {
    let c = sum / (sum * sum + 15.0).sqrt();
    c.clamp(-1.0, 1.0)
}
