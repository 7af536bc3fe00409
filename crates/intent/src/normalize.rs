//! JSON recovery and schema normalization for classifier output.
//!
//! The model is *asked* for strict JSON; the code assumes it got anything
//! but. Recovery order: the first `{`..last `}` substring, then the whole
//! text. Whatever parses is then normalized field by field — defaults for
//! missing values, clamps for ranges, truncation for overlong text, list
//! coercion for scalars — so the result is always schema-valid.

use kindred_core::intent::{
    EmotionalState, Intent, IntentAnalysisResult, MAX_PERSONA_HINT, MAX_REPLY_SEED,
    MAX_SHORT_EXPLANATION, MAX_UNDERLYING_NEED, Receptivity,
};
use serde_json::Value;

/// Try to extract a JSON object from raw model output.
///
/// Takes the first `{` .. last `}` span first (models love to wrap JSON in
/// prose or code fences), then falls back to parsing the whole text. Returns
/// `None` when neither parses to an object.
pub fn safe_load_json(raw_text: &str) -> Option<Value> {
    if raw_text.is_empty() {
        return None;
    }

    if let (Some(start), Some(end)) = (raw_text.find('{'), raw_text.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&raw_text[start..=end])
        && value.is_object()
    {
        return Some(value);
    }

    match serde_json::from_str::<Value>(raw_text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Hard character-boundary-safe truncation.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

/// Truncation with a trailing ellipsis for human-facing fields.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// Normalize a parsed (or partially parsed) object into a schema-valid
/// report. Total: any input object produces a valid result.
pub fn normalize(raw: &Value) -> IntentAnalysisResult {
    let primary_intent = raw
        .get("primary_intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .unwrap_or_default();

    // Scalars become single-element lists; unknown tokens are dropped.
    let secondary_intents = match raw.get("secondary_intents") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(Intent::parse)
            .collect(),
        Some(Value::String(s)) => Intent::parse(s).into_iter().collect(),
        _ => Vec::new(),
    };

    let emotional_state = raw
        .get("emotional_state")
        .and_then(Value::as_str)
        .and_then(EmotionalState::parse)
        .unwrap_or_default();

    let emotional_intensity = coerce_int(raw.get("emotional_intensity"))
        .unwrap_or(3)
        .clamp(1, 10) as u8;

    let underlying_need = raw
        .get("underlying_need")
        .or_else(|| raw.get("underlyingNeed"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(|s| truncate(s, MAX_UNDERLYING_NEED))
        .unwrap_or_else(|| "unknown".into());

    let user_receptivity = raw
        .get("user_receptivity")
        .and_then(Value::as_str)
        .and_then(Receptivity::parse)
        .unwrap_or_default();

    let confidence = coerce_float(raw.get("confidence"))
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let short_explanation = raw
        .get("short_explanation")
        .or_else(|| raw.get("explanation"))
        .and_then(Value::as_str)
        .map(strip_stack_noise)
        .filter(|s| !s.is_empty())
        .map(|s| truncate_with_ellipsis(&s, MAX_SHORT_EXPLANATION));

    let persona_hint = raw
        .get("persona_hint")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, MAX_PERSONA_HINT));

    let reply_seed = raw
        .get("reply_seed")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, MAX_REPLY_SEED));

    IntentAnalysisResult {
        primary_intent,
        secondary_intents,
        emotional_state,
        emotional_intensity,
        underlying_need,
        user_receptivity,
        confidence,
        short_explanation,
        persona_hint,
        reply_seed,
    }
}

/// Accept integers, floats, and numeric strings.
fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accept floats, integers, and numeric strings.
fn coerce_float(value: Option<&Value>) -> Option<f32> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

/// Drop anything that looks like an error trace leaking into the
/// explanation field.
fn strip_stack_noise(s: &str) -> String {
    let lowered = s.to_lowercase();
    let cut = lowered.find("traceback").or_else(|| lowered.find("stack trace"));
    match cut {
        Some(idx) => s[..idx].trim().to_string(),
        None => s.trim().to_string(),
    }
}
