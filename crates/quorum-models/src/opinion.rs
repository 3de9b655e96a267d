use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signal::{clamp_confidence, Action};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Parsed,
    /// Kept for audit, excluded from every numeric aggregation.
    Unparseable,
}

/// One AI model's interpretation of a shared analysis prompt.
///
/// Deserialized opinions get the same confidence clamp as [`ModelOpinion::parsed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "OpinionRecord")]
pub struct ModelOpinion {
    /// Which backend (and model) produced the text, e.g. "claude:claude-3-5-haiku-latest".
    pub source_id: String,
    pub raw_text: String,
    pub action: Option<Action>,
    pub confidence: Option<Decimal>,
    pub parse_status: ParseStatus,
}

impl ModelOpinion {
    pub fn parsed(
        source_id: impl Into<String>,
        raw_text: impl Into<String>,
        action: Action,
        confidence: Option<Decimal>,
    ) -> Self {
        let source_id = source_id.into();
        let confidence = confidence.map(|c| clamp_confidence(&source_id, c));
        Self {
            source_id,
            raw_text: raw_text.into(),
            action: Some(action),
            confidence,
            parse_status: ParseStatus::Parsed,
        }
    }

    pub fn unparseable(source_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            raw_text: raw_text.into(),
            action: None,
            confidence: None,
            parse_status: ParseStatus::Unparseable,
        }
    }

    /// The action this opinion contributes, if any.
    ///
    /// An opinion marked parsed but carrying no action (possible when the
    /// record arrives over the wire) counts as unparseable.
    pub fn parsed_action(&self) -> Option<Action> {
        match self.parse_status {
            ParseStatus::Parsed => self.action,
            ParseStatus::Unparseable => None,
        }
    }
}

/// Wire shape of an opinion before its confidence is clamped.
#[derive(Debug, Deserialize)]
struct OpinionRecord {
    source_id: String,
    #[serde(default)]
    raw_text: String,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    confidence: Option<Decimal>,
    parse_status: ParseStatus,
}

impl From<OpinionRecord> for ModelOpinion {
    fn from(record: OpinionRecord) -> Self {
        let confidence = record
            .confidence
            .map(|c| clamp_confidence(&record.source_id, c));
        Self {
            source_id: record.source_id,
            raw_text: record.raw_text,
            action: record.action,
            confidence,
            parse_status: record.parse_status,
        }
    }
}

/// Cross-model agreement for a single agent's decision context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgreementJudgment {
    /// Fraction in [0, 1] of parseable opinions sharing the majority action.
    pub agreement_ratio: Decimal,
    /// Plurality action, or `None` when nothing parsed or the top counts tied.
    pub majority_action: Option<Action>,
}

impl AgreementJudgment {
    /// Judgment used when no cross-validation was performed.
    pub fn unvalidated() -> Self {
        Self {
            agreement_ratio: Decimal::ONE,
            majority_action: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parsed_opinion_clamps_confidence() {
        let opinion = ModelOpinion::parsed("claude", "BUY", Action::Buy, Some(dec!(1.4)));
        assert_eq!(opinion.confidence, Some(Decimal::ONE));
        assert_eq!(opinion.parsed_action(), Some(Action::Buy));
    }

    #[test]
    fn unparseable_opinion_has_no_action() {
        let opinion = ModelOpinion::unparseable("groq", "rate limited");
        assert_eq!(opinion.parse_status, ParseStatus::Unparseable);
        assert_eq!(opinion.parsed_action(), None);
    }

    #[test]
    fn parsed_without_action_counts_as_unparseable() {
        let json = r#"{
            "source_id": "gemini",
            "raw_text": "...",
            "action": null,
            "confidence": null,
            "parse_status": "parsed"
        }"#;
        let opinion: ModelOpinion = serde_json::from_str(json).unwrap();
        assert_eq!(opinion.parsed_action(), None);
    }

    #[test]
    fn wire_confidence_is_clamped() {
        let json = r#"{
            "source_id": "groq",
            "raw_text": "BUY!!!",
            "action": "buy",
            "confidence": "50000000000000000000000000000",
            "parse_status": "parsed"
        }"#;
        let opinion: ModelOpinion = serde_json::from_str(json).unwrap();
        assert_eq!(opinion.confidence, Some(Decimal::ONE));

        let negative: ModelOpinion = serde_json::from_str(
            r#"{"source_id": "x", "action": "sell", "confidence": "-3", "parse_status": "parsed"}"#,
        )
        .unwrap();
        assert_eq!(negative.confidence, Some(Decimal::ZERO));
        assert_eq!(negative.raw_text, "");
    }

    #[test]
    fn roundtrip_opinion() {
        let opinion = ModelOpinion::parsed(
            "claude:haiku",
            r#"{"action": "sell", "confidence": "0.7"}"#,
            Action::Sell,
            Some(dec!(0.7)),
        );
        let json = serde_json::to_string(&opinion).unwrap();
        let parsed: ModelOpinion = serde_json::from_str(&json).unwrap();
        assert_eq!(opinion, parsed);
    }
}
