//! Format detection
//!
//! Every registered parser scores the decoded text, the scores are ranked
//! and a few rules on top decide the winner:
//!
//! - scores within a small epsilon tie-break toward the more structured
//!   format (markup, then object notation, then text)
//! - when neither structured format is convincing, text wins
//! - a file extension that agrees with the winner adds a small bonus
//!
//! Detection never fails for decodable input; an unrecognisable file comes
//! back as text with a low score and the caller decides what is too low.

use serde::Serialize;
use tracing::debug;

use crate::encoding::{self, TextEncoding};
use crate::model::NfoFormat;
use crate::registry::FormatRegistry;

/// Score one parser gave the input
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormatScore {
    pub format: NfoFormat,
    pub confidence: f64,
}

/// Outcome of format detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDetection {
    /// Most likely format
    pub format: NfoFormat,
    /// Confidence in [0.0, 1.0] for `format`
    pub confidence: f64,
    /// Encoding the bytes were decoded with
    pub encoding: TextEncoding,
    /// Other formats with a non-zero score, best first
    pub fallbacks: Vec<NfoFormat>,
    /// Raw parser scores, most structured format first
    pub scores: Vec<FormatScore>,
}

/// Tunables for [`FormatDetector`]
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Scores closer than this are considered equal
    pub tie_epsilon: f64,
    /// Minimum score for markup or object notation to beat text
    pub structured_threshold: f64,
    /// Bonus when the file extension agrees with the winner
    pub extension_bonus: f64,
    /// Whether extension hints are used at all
    pub use_extension: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: 0.01,
            structured_threshold: 0.5,
            extension_bonus: 0.05,
            use_extension: true,
        }
    }
}

impl DetectorConfig {
    pub fn with_tie_epsilon(mut self, epsilon: f64) -> Self {
        self.tie_epsilon = epsilon;
        self
    }

    pub fn with_structured_threshold(mut self, threshold: f64) -> Self {
        self.structured_threshold = threshold;
        self
    }

    pub fn with_extension_bonus(mut self, bonus: f64) -> Self {
        self.extension_bonus = bonus;
        self
    }

    pub fn with_extension_hints(mut self, use_extension: bool) -> Self {
        self.use_extension = use_extension;
        self
    }
}

/// Ranks formats for a piece of text
#[derive(Debug, Clone, Default)]
pub struct FormatDetector {
    config: DetectorConfig,
}

impl FormatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Decode raw bytes and detect their format
    pub fn detect_bytes(
        &self,
        registry: &FormatRegistry,
        bytes: &[u8],
        hint: Option<NfoFormat>,
    ) -> (String, FormatDetection) {
        let (text, detection) = encoding::decode(bytes);
        let result = self.detect_text(registry, &text, hint, detection.encoding);
        (text, result)
    }

    /// Detect the format of decoded text
    pub fn detect_text(
        &self,
        registry: &FormatRegistry,
        text: &str,
        hint: Option<NfoFormat>,
        encoding: TextEncoding,
    ) -> FormatDetection {
        if text.trim().is_empty() {
            return FormatDetection {
                format: NfoFormat::Text,
                confidence: 0.0,
                encoding,
                fallbacks: Vec::new(),
                scores: Vec::new(),
            };
        }

        let scores: Vec<FormatScore> = registry
            .parsers()
            .map(|parser| FormatScore {
                format: parser.format(),
                confidence: sanitize(parser.confidence(text)),
            })
            .collect();

        let (format, mut confidence) = self.pick(&scores);

        if self.config.use_extension && hint == Some(format) && confidence > 0.0 {
            confidence = (confidence + self.config.extension_bonus).min(1.0);
        }

        let mut others: Vec<FormatScore> = scores
            .iter()
            .copied()
            .filter(|score| score.format != format && score.confidence > 0.0)
            .collect();
        others.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.format.structure_rank().cmp(&b.format.structure_rank()))
        });

        debug!(%format, confidence, ?hint, "Detected format");

        FormatDetection {
            format,
            confidence,
            encoding,
            fallbacks: others.into_iter().map(|score| score.format).collect(),
            scores,
        }
    }

    /// Winning format and its raw score
    fn pick(&self, scores: &[FormatScore]) -> (NfoFormat, f64) {
        let score_of = |format: NfoFormat| {
            scores
                .iter()
                .find(|score| score.format == format)
                .map(|score| score.confidence)
        };

        let structured_best = [NfoFormat::Xml, NfoFormat::Json]
            .into_iter()
            .filter_map(score_of)
            .fold(0.0_f64, f64::max);
        if structured_best < self.config.structured_threshold {
            if let Some(text) = score_of(NfoFormat::Text) {
                return (NfoFormat::Text, text);
            }
        }

        // Scores arrive most structured first, so earlier entries win ties
        let mut best: Option<FormatScore> = None;
        for score in scores {
            match best {
                Some(current) if score.confidence <= current.confidence + self.config.tie_epsilon => {}
                _ => best = Some(*score),
            }
        }
        best.map(|score| (score.format, score.confidence))
            .unwrap_or((NfoFormat::Text, 0.0))
    }
}

fn sanitize(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
