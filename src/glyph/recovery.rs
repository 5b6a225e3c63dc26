//! Learning bitmaps for missing characters from an external recognizer.
//!
//! A recovery pass walks the missing-character log, asks a
//! [`GlyphRecognizer`] for each character, validates the returned PNG and
//! writes it into the [`GlyphRegistry`]. Failures leave the character
//! unresolved; they are reported, never raised.
//!
//! The pass takes `&mut GlyphRegistry`, so it cannot overlap a batch that
//! is reading the registry.

use super::codepoint_key;
use super::registry::GlyphRegistry;
use crate::error::RecoveryError;
use crate::prompts::{glyph_request, GLYPH_SYSTEM_PROMPT};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Produces a PNG for one character.
pub trait GlyphRecognizer: Send + Sync {
    /// Raw PNG bytes for `ch`, or why none could be produced.
    fn recognize(&self, ch: char) -> BoxFuture<'_, Result<Vec<u8>, RecoveryError>>;
}

/// Outcome of [`run_recovery_pass`].
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Characters now present in the registry.
    pub learned: Vec<char>,
    /// Characters that stay missing, with the reason.
    pub failed: Vec<(char, RecoveryError)>,
}

/// Ask `recognizer` for every character in `pending` and record each valid
/// bitmap in `registry`.
///
/// The registry is only modified in memory; the caller persists it.
pub async fn run_recovery_pass(
    registry: &mut GlyphRegistry,
    pending: &[char],
    recognizer: &dyn GlyphRecognizer,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    for &ch in pending {
        let key = codepoint_key(ch);
        let result = recognizer
            .recognize(ch)
            .await
            .and_then(|png| validate_png(&key, png));

        match result {
            Ok(png) => {
                debug!(codepoint = %key, bytes = png.len(), "glyph learned");
                registry.insert(ch, STANDARD.encode(&png));
                report.learned.push(ch);
            }
            Err(e) => {
                warn!(codepoint = %key, "glyph recovery failed: {e}");
                report.failed.push((ch, e));
            }
        }
    }

    info!(
        learned = report.learned.len(),
        failed = report.failed.len(),
        "glyph recovery pass finished"
    );
    report
}

fn validate_png(key: &str, png: Vec<u8>) -> Result<Vec<u8>, RecoveryError> {
    if png.is_empty() {
        return Err(RecoveryError::InvalidResponse {
            key: key.to_string(),
            detail: "empty image".into(),
        });
    }
    image::load_from_memory(&png).map_err(|e| RecoveryError::InvalidResponse {
        key: key.to_string(),
        detail: e.to_string(),
    })?;
    Ok(png)
}

// ── LLM-backed recognizer ────────────────────────────────────────────────

/// A [`GlyphRecognizer`] that asks an `edgequake-llm` provider to draw the
/// character and return it as base64 PNG inside a small JSON object.
pub struct LlmGlyphRecognizer {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmGlyphRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.0,
            max_tokens: 8192,
        }
    }

    /// Instantiate a named provider (`openai`, `anthropic`, …) with `model`.
    /// The provider reads its API key from the environment.
    pub fn from_name(provider_name: &str, model: &str) -> Result<Self, RecoveryError> {
        ProviderFactory::create_llm_provider(provider_name, model)
            .map(Self::new)
            .map_err(|e| RecoveryError::Unavailable(format!("{provider_name}: {e}")))
    }

    /// Auto-detect a provider from the environment.
    pub fn from_env() -> Result<Self, RecoveryError> {
        let (provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
            RecoveryError::Unavailable(format!(
                "no LLM provider could be auto-detected; set OPENAI_API_KEY, \
                 ANTHROPIC_API_KEY or name a provider explicitly ({e})"
            ))
        })?;
        Ok(Self::new(provider))
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(256);
        self
    }

    async fn ask(&self, ch: char) -> Result<Vec<u8>, RecoveryError> {
        let key = codepoint_key(ch);
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(GLYPH_SYSTEM_PROMPT),
            ChatMessage::user(glyph_request(ch)),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| RecoveryError::Unavailable(e.to_string()))?;

        debug!(
            codepoint = %key,
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            elapsed = ?start.elapsed(),
            "glyph response"
        );
        decode_glyph_response(&key, &response.content)
    }
}

impl GlyphRecognizer for LlmGlyphRecognizer {
    fn recognize(&self, ch: char) -> BoxFuture<'_, Result<Vec<u8>, RecoveryError>> {
        Box::pin(self.ask(ch))
    }
}

/// Strips a wrapping ```json fence if the model added one anyway.
static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?\s*```\s*$").unwrap());

#[derive(Deserialize)]
struct GlyphPayload {
    data: String,
}

/// Pull the base64 PNG out of a model reply.
fn decode_glyph_response(key: &str, content: &str) -> Result<Vec<u8>, RecoveryError> {
    let invalid = |detail: String| RecoveryError::InvalidResponse {
        key: key.to_string(),
        detail,
    };

    let body = RE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return Err(invalid("no JSON object in response".into())),
    };

    let payload: GlyphPayload =
        serde_json::from_str(json).map_err(|e| invalid(format!("malformed JSON: {e}")))?;
    let data = payload
        .data
        .trim()
        .trim_start_matches("data:image/png;base64,");
    STANDARD
        .decode(data)
        .map_err(|e| invalid(format!("bad base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn tiny_png() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(4, 4, image::Luma([0u8]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct StubRecognizer {
        answers: HashMap<char, Result<Vec<u8>, RecoveryError>>,
    }

    impl GlyphRecognizer for StubRecognizer {
        fn recognize(&self, ch: char) -> BoxFuture<'_, Result<Vec<u8>, RecoveryError>> {
            let answer = self
                .answers
                .get(&ch)
                .cloned()
                .unwrap_or_else(|| Err(RecoveryError::Unavailable("offline".into())));
            Box::pin(async move { answer })
        }
    }

    #[tokio::test]
    async fn pass_learns_valid_and_reports_failures() {
        let mut answers = HashMap::new();
        answers.insert('🦀', Ok(tiny_png()));
        answers.insert('中', Ok(b"not a png".to_vec()));
        let recognizer = StubRecognizer { answers };

        let mut registry = GlyphRegistry::new();
        let report = run_recovery_pass(&mut registry, &['🦀', '中', '☃'], &recognizer).await;

        assert_eq!(report.learned, vec!['🦀']);
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(
            report.failed[0],
            ('中', RecoveryError::InvalidResponse { .. })
        ));
        assert!(matches!(report.failed[1], ('☃', RecoveryError::Unavailable(_))));

        let stored = registry.get('🦀').unwrap();
        assert_eq!(STANDARD.decode(&stored.bitmap_data).unwrap(), tiny_png());
        assert!(registry.get('中').is_none());
    }

    #[test]
    fn decode_plain_json() {
        let b64 = STANDARD.encode(b"png-bytes");
        let reply = format!(r#"{{"data": "{b64}"}}"#);
        assert_eq!(decode_glyph_response("0x41", &reply).unwrap(), b"png-bytes");
    }

    #[test]
    fn decode_fenced_json_with_data_url() {
        let b64 = STANDARD.encode(b"xyz");
        let reply = format!("```json\n{{\"data\": \"data:image/png;base64,{b64}\"}}\n```");
        assert_eq!(decode_glyph_response("0x41", &reply).unwrap(), b"xyz");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_glyph_response("0x41", "I cannot draw that").is_err());
        assert!(decode_glyph_response("0x41", r#"{"data": "!!!"}"#).is_err());
        assert!(decode_glyph_response("0x41", r#"{"image": "AAAA"}"#).is_err());
    }
}
