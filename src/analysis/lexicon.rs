//! Tokenization, stop-words and the weighted political lexicons.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

/// Danish function words ignored when counting tokens.
const DANISH_STOP_WORDS: &[&str] = &[
    "ad", "af", "alle", "alt", "anden", "andet", "andre", "at", "bare", "begge", "blev", "blive",
    "bliver", "da", "de", "dem", "den", "denne", "der", "deres", "det", "dette", "dig", "din",
    "dine", "disse", "dit", "dog", "du", "efter", "eller", "en", "end", "er", "et", "for", "fordi",
    "fra", "få", "har", "havde", "have", "hele", "hen", "hende", "her", "hos", "hun", "hvad",
    "hvem", "hver", "hvilke", "hvis", "hvor", "hvordan", "hvorfor", "i", "ikke", "ind", "ingen",
    "jeg", "jer", "jo", "kan", "kun", "kunne", "lidt", "man", "mange", "med", "meget", "men",
    "mens", "mere", "mig", "min", "mine", "mit", "mod", "må", "ned", "nej", "noget", "nogle",
    "nu", "når", "og", "også", "om", "op", "os", "over", "på", "sig", "sin", "sine", "sit",
    "skal", "skulle", "som", "så", "sådan", "thi", "til", "ud", "under", "var", "vi", "vil",
    "ville", "vor", "vores", "være", "været",
];

static STOP_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| DANISH_STOP_WORDS.iter().copied().collect());

/// Lowercased word tokens of `text`, stop-words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Count every non-stop-word token of `text`.
pub fn word_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// The `n` most frequent words; ties are broken alphabetically.
pub fn top_words(counts: &HashMap<String, usize>, n: usize) -> BTreeMap<String, usize> {
    let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(word, count)| (word.clone(), *count))
        .collect()
}

/// Two opposing word→weight lexicons.
///
/// `left` is pole A (pulls the score towards -1), `right` is pole B (towards
/// +1). Maps are ordered so sums are accumulated in a fixed order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Lexicon {
    pub left: BTreeMap<String, f64>,
    pub right: BTreeMap<String, f64>,
}

/// Weighted hit totals of one text against a [`Lexicon`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexiconHits {
    pub left: f64,
    pub right: f64,
}

impl LexiconHits {
    pub fn total(&self) -> f64 {
        self.left + self.right
    }

    /// `(right - left) / (left + right)`, or 0 without hits.
    pub fn rule_score(&self) -> f64 {
        let total = self.total();
        if total > 0.0 {
            ((self.right - self.left) / total).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Saturates at 1.0 after ten weighted hits.
    pub fn confidence(&self) -> f64 {
        (self.total() / 10.0).min(1.0)
    }
}

impl Lexicon {
    pub fn danish() -> Self {
        let left = [
            ("solidaritet", 1.0),
            ("velfærd", 0.8),
            ("lighed", 0.9),
            ("fællesskab", 0.7),
            ("offentlig", 0.6),
            ("fagforening", 0.8),
            ("arbejderrettigheder", 0.9),
            ("klimahandling", 0.7),
            ("bæredygtighed", 0.6),
            ("mangfoldighed", 0.7),
        ];
        let right = [
            ("frihed", 1.0),
            ("marked", 0.8),
            ("skattelettelser", 0.9),
            ("privat", 0.7),
            ("individ", 0.6),
            ("erhvervsliv", 0.8),
            ("konkurrence", 0.7),
            ("vækst", 0.6),
            ("innovation", 0.6),
            ("iværksætteri", 0.7),
        ];
        Self {
            left: left.iter().map(|(w, s)| (w.to_string(), *s)).collect(),
            right: right.iter().map(|(w, s)| (w.to_string(), *s)).collect(),
        }
    }

    /// Weights must be positive and finite; words are matched lowercased.
    pub fn validate(&self) -> Result<()> {
        for (pole, words) in [("left", &self.left), ("right", &self.right)] {
            for (word, weight) in words {
                if !weight.is_finite() || *weight <= 0.0 {
                    return Err(Error::config(format!(
                        "lexicon.{pole}: weight for '{word}' must be positive, got {weight}"
                    )));
                }
                if word.to_lowercase() != *word {
                    return Err(Error::config(format!(
                        "lexicon.{pole}: '{word}' must be lowercase"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn hits(&self, counts: &HashMap<String, usize>) -> LexiconHits {
        LexiconHits {
            left: weighted_sum(&self.left, counts),
            right: weighted_sum(&self.right, counts),
        }
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::danish()
    }
}

fn weighted_sum(words: &BTreeMap<String, f64>, counts: &HashMap<String, usize>) -> f64 {
    words
        .iter()
        .filter_map(|(word, weight)| counts.get(word).map(|count| *count as f64 * weight))
        .sum()
}
