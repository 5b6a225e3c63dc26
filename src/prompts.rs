//! Prompts for LLM-backed glyph recognition.
//!
//! Kept apart from [`crate::glyph::recovery`] so tests can inspect the exact
//! wording without a provider, and so the wording can change without
//! touching response parsing.

/// System prompt: fixes the output contract.
pub const GLYPH_SYSTEM_PROMPT: &str = r#"You are a glyph rasteriser. You draw single Unicode characters as small monochrome PNG images.

Rules:
1. The image is exactly 64x64 pixels, a black glyph centred on a white background.
2. Draw the character's most common printed form. Do not add borders, labels or shadows.
3. Reply with JSON only, in the form {"data": "BASE64"} where BASE64 is the PNG file encoded in standard base64.
4. Do NOT wrap the JSON in code fences. Do NOT add commentary."#;

/// User prompt for one character.
pub fn glyph_request(ch: char) -> String {
    format!(
        "Draw the character '{ch}' (U+{:04X}) as a 64x64 PNG. Return JSON: {{\"data\": \"BASE64\"}}",
        ch as u32
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_states_the_contract() {
        assert!(GLYPH_SYSTEM_PROMPT.contains("64x64"));
        assert!(GLYPH_SYSTEM_PROMPT.contains(r#"{"data": "BASE64"}"#));
    }

    #[test]
    fn request_names_the_codepoint() {
        let p = glyph_request('🦀');
        assert!(p.contains("U+1F980"), "got: {p}");
        assert!(p.contains('🦀'));
        assert!(glyph_request('a').contains("U+0061"));
    }
}
