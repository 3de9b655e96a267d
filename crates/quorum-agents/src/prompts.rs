use quorum_models::{AnalysisContext, ModelOpinion};

use crate::error::AgentError;

/// System and user halves of one model query.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrompt {
    pub system: String,
    pub user: String,
}

/// Response contract shared by every panel prompt.
fn response_schema() -> String {
    let example = serde_json::json!({
        "action": "buy | sell | hold",
        "confidence": "0.65",
        "rationale": "<two or three sentences naming the readings that drove the call>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn technical_system_prompt() -> String {
    format!(
        "You are the technical analysis member of QUORUM, a panel of independent trading \
         analysts. Recommend one action for the symbol in the user message using price and \
         indicator data only.\n\n\
         ## DATA FORMAT\n\n\
         `market_data` is a JSON object keyed by cache key (SYMBOL is the traded symbol):\n\
         - `quote:SYMBOL` → {{\"price\": current_price, \"volume\": ...}}\n\
         - `indicator:rsi_14:SYMBOL` → {{\"value\": ...}}\n\
         - `indicator:macd:SYMBOL` → {{\"macd_line\": ..., \"signal_line\": ...}}\n\
         - `indicator:sma_20:SYMBOL`, `indicator:sma_50:SYMBOL` → {{\"value\": ...}}\n\
         Where a value is an array, the last element is the most recent reading. Missing keys \
         mean the data is unavailable; do not invent it.\n\n\
         ## INTERPRETATION\n\n\
         - RSI below 30 is oversold (leans buy); above 70 is overbought (leans sell).\n\
         - MACD line above its signal line is bullish; below is bearish.\n\
         - SMA 20 above SMA 50 is an uptrend; below is a downtrend.\n\
         - Conflicting indicators lower confidence; they do not cancel into a strong hold.\n\
         - With little or no data, answer hold with confidence at or below 0.3.\n\n\
         Respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         `action` is exactly one of buy, sell, hold. `confidence` is a decimal between 0.0 and 1.0.",
        response_schema()
    )
}

pub fn sentiment_system_prompt() -> String {
    format!(
        "You are the sentiment analysis member of QUORUM, a panel of independent trading \
         analysts. Recommend one action for the symbol in the user message from news and \
         market mood.\n\n\
         ## DATA FORMAT\n\n\
         `market_data` is a JSON object keyed by cache key (SYMBOL is the traded symbol):\n\
         - `sentiment:news:SYMBOL` → {{\"score\": -1.0..1.0, \"headlines\": [...]}}\n\
         - `sentiment:market:SYMBOL` → {{\"score\": -1.0..1.0}}\n\
         - `quote:SYMBOL` → {{\"price\": current_price, ...}}\n\
         Missing keys mean the data is unavailable; do not invent it.\n\n\
         ## INTERPRETATION\n\n\
         - A combined score above 0.2 leans buy; below -0.2 leans sell; otherwise hold.\n\
         - Confidence grows with the magnitude of the score and the agreement between news \
         and market mood; never exceed 0.9.\n\
         - A single dramatic headline is weaker evidence than a consistent trend.\n\n\
         Respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         `action` is exactly one of buy, sell, hold. `confidence` is a decimal between 0.0 and 1.0.",
        response_schema()
    )
}

pub fn macro_system_prompt() -> String {
    format!(
        "You are the macroeconomic member of QUORUM, a panel of independent trading analysts. \
         Recommend one action for the symbol in the user message from broad market \
         conditions.\n\n\
         ## DATA FORMAT\n\n\
         `market_data` may contain `ref:VIX`, `ref:SPY` and sector ETF entries such as \
         `ref:XLK`, each {{\"value\": ...}}. Missing keys mean the data is unavailable.\n\n\
         ## INTERPRETATION\n\n\
         - VIX above 30 signals stress: lean hold or sell, lower confidence for buys.\n\
         - A rising SPY with a calm VIX supports buys.\n\
         - Sector weakness relative to SPY leans against buys in that sector.\n\n\
         Respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         `action` is exactly one of buy, sell, hold. `confidence` is a decimal between 0.0 and 1.0.",
        response_schema()
    )
}

/// System prompt for a panel domain, if one is defined.
pub fn system_prompt_for(domain: &str) -> Option<String> {
    match domain {
        "technical" => Some(technical_system_prompt()),
        "sentiment" => Some(sentiment_system_prompt()),
        "macro" => Some(macro_system_prompt()),
        _ => None,
    }
}

/// User half of a panel query: the symbol and its market data snapshot.
pub fn user_prompt(context: &AnalysisContext) -> Result<String, AgentError> {
    let body = serde_json::json!({
        "symbol": context.symbol,
        "as_of": context.started_at,
        "market_data": context.market_data,
    });
    Ok(serde_json::to_string_pretty(&body)?)
}

pub fn validator_system_prompt() -> String {
    "You review stock analysis answers produced by several AI models for the same prompt. \
     Check each answer for accuracy and reasonableness against the data in the prompt. \
     Summarize the best-supported action, point out disagreements between the models, and \
     flag any answer that misreads or invents data. Reply in plain text, at most six \
     sentences."
        .to_string()
}

/// User half of a validation query: the original prompt followed by every
/// model's raw answer.
pub fn validation_prompt(prompt: &ModelPrompt, opinions: &[ModelOpinion]) -> String {
    let responses: Vec<String> = opinions
        .iter()
        .map(|o| format!("{}: {}", o.source_id, o.raw_text.trim()))
        .collect();
    format!(
        "Prompt given to every model:\n\"{}\"\n\nResponses:\n{}",
        prompt.user,
        responses.join("\n")
    )
}
