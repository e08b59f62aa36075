//! Keyword-Lexicon Sentiment Scoring
//!
//! Scores free-form business text (CRM notes, call summaries, deal updates)
//! against a weighted financial vocabulary. A negator flips the polarity of
//! the word that follows it and an intensifier raises its weight, so
//! "no growth" counts against a note while "very strong" counts double.
//! The report feeds the lead-scoring feature set and is exposed over HTTP.

use crate::error::{ConnectorError, ConnectorResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// Vocabulary
// ============================================================================

const POSITIVE_WORDS: &[&str] = &[
    "profit", "growth", "increase", "bull", "rise", "gain", "up", "strong", "outperform", "beat",
    "exceed", "bullish", "rally", "surge", "boom", "expansion", "revenue", "earnings", "dividend",
    "upgrade", "buy", "overweight", "momentum", "breakout",
];

const NEGATIVE_WORDS: &[&str] = &[
    "loss", "decline", "decrease", "bear", "fall", "drop", "down", "weak", "underperform", "miss",
    "disappoint", "bearish", "crash", "plunge", "recession", "contraction", "debt", "deficit",
    "cut", "downgrade", "sell", "underweight", "volatility", "breakdown",
];

const NEUTRAL_WORDS: &[&str] = &[
    "stable", "flat", "unchanged", "sideways", "consolidate", "maintain", "steady", "hold",
    "neutral", "mixed",
];

/// Words whose presence weighs 1.5x instead of 1.0x.
const STRONG_POSITIVE: &[&str] = &["profit", "growth", "bullish"];
const STRONG_NEGATIVE: &[&str] = &["loss", "bearish", "crash"];

/// A negator flips the polarity of the following vocabulary word.
const NEGATORS: &[&str] = &["not", "no", "never", "without", "hardly"];

/// An intensifier multiplies the following word's weight by 1.5.
const INTENSIFIERS: &[&str] = &["very", "highly", "extremely", "significantly", "strongly"];

/// Terms used to judge how business-relevant a text is at all.
const DOMAIN_TERMS: &[&str] = &[
    "stock", "market", "trading", "investment", "portfolio", "earnings", "revenue", "profit",
    "dividend", "shares", "broker", "analyst", "forecast", "quarter", "financial",
];

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());
static DOLLAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());
static MILLION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)M").unwrap());
static BILLION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)B").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{1,5}\b").unwrap());
static MONEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+(?:,\d+)*(?:\.\d+)?[KMB]?").unwrap());
static PERCENT_MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?%").unwrap());

// ============================================================================
// Types
// ============================================================================

/// Final sentiment classification for a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

/// Normalized per-polarity signal strengths; each is in `[0, 1]` before any
/// context boost is applied.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SentimentSignals {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// Kind of entity picked out of the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    Symbol,
    Money,
    Percent,
}

/// A concrete entity mention found in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub kind: MentionKind,
    pub value: String,
}

/// Optional context that biases the scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentimentContext {
    /// Customer industry, e.g. "technology" or "utilities".
    pub industry: Option<String>,
    /// Broad market climate, "bull" or "bear".
    pub market: Option<String>,
}

/// Full sentiment analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReport {
    pub label: SentimentLabel,
    /// Net score in `[-1, 1]` (positive minus negative signal).
    pub score: f64,
    /// Confidence in the classification, capped at 0.95.
    pub confidence: f64,
    pub signals: SentimentSignals,
    /// Vocabulary words that actually matched, capped at five.
    pub keywords: Vec<String>,
    pub mentions: Vec<Mention>,
    pub word_count: usize,
    /// How business-relevant the text is, `[0, 1]`.
    pub relevance: f64,
    pub summary: String,
}

// ============================================================================
// Analysis
// ============================================================================

/// Analyze a text without additional context.
pub fn analyze(text: &str) -> ConnectorResult<SentimentReport> {
    analyze_with_context(text, None)
}

/// Analyze a text, optionally biased by industry and market climate.
pub fn analyze_with_context(
    text: &str,
    context: Option<&SentimentContext>,
) -> ConnectorResult<SentimentReport> {
    if text.trim().is_empty() {
        return Err(ConnectorError::validation("text", "Text input is required"));
    }

    let normalized = normalize_text(text);
    let words: Vec<String> = normalized
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let (mut signals, keywords) = score_words(&words);
    if let Some(ctx) = context {
        apply_context(&mut signals, ctx);
    }

    let net = signals.positive - signals.negative;
    let label = if net > 0.1 {
        SentimentLabel::Positive
    } else if net < -0.1 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    let mentions = extract_mentions(text);
    let confidence = confidence_score(&signals, mentions.len(), words.len());
    let relevance = domain_relevance(text);
    let summary = format!(
        "Net sentiment score: {:.3} (positive: {:.3}, negative: {:.3}, neutral: {:.3})",
        net, signals.positive, signals.negative, signals.neutral
    );

    Ok(SentimentReport {
        label,
        score: net.clamp(-1.0, 1.0),
        confidence,
        signals,
        keywords,
        mentions,
        word_count: words.len(),
        relevance,
        summary,
    })
}

/// Rewrite shorthand amounts ("15%", "$5", "3M", "2B") into words and
/// collapse whitespace so the tokenizer sees uniform input.
fn normalize_text(text: &str) -> String {
    let text = PERCENT_RE.replace_all(text, "${1} percent");
    let text = DOLLAR_RE.replace_all(&text, "${1} dollars");
    let text = MILLION_RE.replace_all(&text, "${1} million");
    let text = BILLION_RE.replace_all(&text, "${1} billion");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
    Neutral,
}

fn polarity_of(word: &str) -> Option<(Polarity, f64)> {
    if POSITIVE_WORDS.contains(&word) {
        let weight = if STRONG_POSITIVE.contains(&word) { 1.5 } else { 1.0 };
        Some((Polarity::Positive, weight))
    } else if NEGATIVE_WORDS.contains(&word) {
        let weight = if STRONG_NEGATIVE.contains(&word) { 1.5 } else { 1.0 };
        Some((Polarity::Negative, weight))
    } else if NEUTRAL_WORDS.contains(&word) {
        Some((Polarity::Neutral, 1.0))
    } else {
        None
    }
}

/// Accumulate weighted polarity signals and the matched vocabulary words.
/// Signals are normalized so they sum to 1 when any word matched.
fn score_words(words: &[String]) -> (SentimentSignals, Vec<String>) {
    let mut signals = SentimentSignals::default();
    let mut keywords = Vec::new();

    for (index, word) in words.iter().enumerate() {
        let Some((polarity, base_weight)) = polarity_of(word) else {
            continue;
        };

        let previous = index.checked_sub(1).map(|i| words[i].as_str());
        let negated = previous.map_or(false, |p| NEGATORS.contains(&p));
        let weight = if previous.map_or(false, |p| INTENSIFIERS.contains(&p)) {
            base_weight * 1.5
        } else {
            base_weight
        };

        let effective = match (polarity, negated) {
            (Polarity::Positive, false) | (Polarity::Negative, true) => Polarity::Positive,
            (Polarity::Negative, false) | (Polarity::Positive, true) => Polarity::Negative,
            (Polarity::Neutral, _) => Polarity::Neutral,
        };

        match effective {
            Polarity::Positive => signals.positive += weight,
            Polarity::Negative => signals.negative += weight,
            Polarity::Neutral => signals.neutral += weight,
        }

        if !keywords.iter().any(|k| k == word) && keywords.len() < 5 {
            keywords.push(word.clone());
        }
    }

    let total = signals.positive + signals.negative + signals.neutral;
    if total > 0.0 {
        signals.positive /= total;
        signals.negative /= total;
        signals.neutral /= total;
    }

    (signals, keywords)
}

fn apply_context(signals: &mut SentimentSignals, context: &SentimentContext) {
    if let Some(industry) = context.industry.as_deref() {
        match industry.to_lowercase().as_str() {
            "tech" | "technology" => signals.positive *= 1.1,
            "utility" | "utilities" => signals.neutral *= 1.2,
            _ => {}
        }
    }
    if let Some(market) = context.market.as_deref() {
        match market.to_lowercase().as_str() {
            "bull" => signals.positive *= 1.1,
            "bear" => signals.negative *= 1.1,
            _ => {}
        }
    }
}

/// Pull ticker-style symbols, monetary amounts and percentages out of the
/// raw (un-normalized) text.
fn extract_mentions(text: &str) -> Vec<Mention> {
    let mut mentions = Vec::new();

    for symbol in SYMBOL_RE.find_iter(text) {
        // Five-letter matches are usually ordinary words in caps.
        if symbol.as_str().len() <= 4 {
            mentions.push(Mention {
                kind: MentionKind::Symbol,
                value: symbol.as_str().to_string(),
            });
        }
    }
    for amount in MONEY_RE.find_iter(text) {
        mentions.push(Mention {
            kind: MentionKind::Money,
            value: amount.as_str().to_string(),
        });
    }
    for pct in PERCENT_MENTION_RE.find_iter(text) {
        mentions.push(Mention {
            kind: MentionKind::Percent,
            value: pct.as_str().to_string(),
        });
    }

    mentions
}

/// Confidence grows with signal density, entity mentions and a reasonable
/// text length, starting from 0.5 and capped at 0.95.
fn confidence_score(signals: &SentimentSignals, mention_count: usize, word_count: usize) -> f64 {
    let keyword_factor = ((signals.positive + signals.negative) * 0.3).min(0.3);
    let mention_factor = (mention_count as f64 * 0.05).min(0.15);
    let length_factor = if (10..=100).contains(&word_count) { 0.05 } else { 0.0 };
    (0.5 + keyword_factor + mention_factor + length_factor).min(0.95)
}

fn domain_relevance(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words
        .iter()
        .filter(|w| DOMAIN_TERMS.contains(&w.to_lowercase().as_str()))
        .count();
    (hits as f64 / words.len() as f64 * 5.0).min(1.0)
}

// ============================================================================
// Tests
// ============================================================================
