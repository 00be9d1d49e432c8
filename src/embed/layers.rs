//! The four text-level watermark layers
//!
//! Each layer is a pure function of `(text, fingerprint)`. They are applied
//! by [`super::LayerEmbedder`] in a fixed order because later layers scan
//! text that earlier layers have already rewritten.

use crate::fingerprint::Fingerprint;
use crate::stego;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

/// Opening of the visible fingerprint comment.
pub const VISIBLE_MARKER_PREFIX: &str = "<!-- gdprwiz-fp: ";
/// Closing of the visible fingerprint comment.
pub const VISIBLE_MARKER_SUFFIX: &str = " -->";

/// Words eligible for substitution and their interchangeable variants.
pub const LEXICAL_DICTIONARY: &[(&str, &[&str])] = &[
    ("data", &["data", "information", "details"]),
    ("process", &["process", "handle", "manage"]),
    ("collect", &["collect", "gather", "obtain"]),
    ("personal", &["personal", "individual", "user"]),
];

static LEXICAL_PATTERNS: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    LEXICAL_DICTIONARY
        .iter()
        .map(|(word, variants)| {
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
                .expect("dictionary word is a valid pattern");
            (re, *variants)
        })
        .collect()
});

/// Fixed base spacing written for the whole preview.
const BASE_SPACING_EM: f64 = 0.01;
/// Step between the ten possible encoded spacing values.
const SPACING_STEP_EM: f64 = 0.001;
/// Hex offset of the fingerprint slice that drives the spacing value.
const SPACING_SLICE_OFFSET: usize = 8;

// ─── Layer 1: visible marker ───────────────────────────────────────

/// The single-line comment carrying the fingerprint literal.
pub fn visible_marker(fingerprint: &Fingerprint) -> String {
    format!("{}{}{}", VISIBLE_MARKER_PREFIX, fingerprint, VISIBLE_MARKER_SUFFIX)
}

pub fn add_visible_marker(text: &str, fingerprint: &Fingerprint) -> String {
    format!("{}\n{}", visible_marker(fingerprint), text)
}

// ─── Layer 2: lexical substitution ─────────────────────────────────

/// Replace the first whole-word occurrence (outside markup) of each
/// dictionary word with a variant chosen by a generator seeded from the
/// fingerprint's leading 32 bits. The generator lives only for this call.
///
/// Returns the rewritten text and the number of substitutions made.
pub fn substitute_words(text: &str, fingerprint: &Fingerprint) -> (String, usize) {
    let mut rng = StdRng::seed_from_u64(u64::from(fingerprint.leading_u32()));
    let mut out = text.to_string();
    let mut substituted = 0;

    for (pattern, variants) in LEXICAL_PATTERNS.iter() {
        // Draw for every word so each word's choice is independent of
        // whether earlier words occurred in this particular body.
        let variant = variants[rng.gen_range(0..variants.len())];

        let Some(found) = pattern
            .find_iter(&out)
            .find(|m| !inside_markup(&out, m.start()))
        else {
            continue;
        };

        let range = found.range();
        let replacement = match_case(found.as_str(), variant);
        out.replace_range(range, &replacement);
        substituted += 1;
    }

    (out, substituted)
}

/// True when byte offset `pos` falls inside an unclosed tag. Only a `<`
/// that opens a tag (`<p`, `</`, `<!`, `<?`) counts, so a comparison such
/// as `a < b` in running text is not markup.
fn inside_markup(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    match before.rfind(|c| c == '<' || c == '>') {
        Some(open) if before[open..].starts_with('<') => before[open + 1..]
            .starts_with(|c: char| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?')),
        _ => false,
    }
}

/// Carry the capitalisation of `original` over to `variant`.
fn match_case(original: &str, variant: &str) -> String {
    if original.len() > 1 && original.chars().all(|c| c.is_ascii_uppercase()) {
        return variant.to_ascii_uppercase();
    }
    if original.starts_with(|c: char| c.is_ascii_uppercase()) {
        let mut chars = variant.chars();
        return match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
    }
    variant.to_string()
}

// ─── Layer 3: invisible channel ────────────────────────────────────

pub fn add_invisible_channel(text: &str, fingerprint: &Fingerprint) -> String {
    let mut out = String::with_capacity(text.len() + 64 * 8 * 3);
    out.push_str(text);
    out.push_str(&stego::encode(fingerprint.as_str().as_bytes()));
    out
}

// ─── Layer 4: encoded styling ──────────────────────────────────────

/// Letter-spacing (em) correlated with the fingerprint: one of ten values
/// between 0.010 and 0.019.
pub fn encoded_spacing(fingerprint: &Fingerprint) -> f64 {
    let seed = fingerprint.u32_at(SPACING_SLICE_OFFSET);
    BASE_SPACING_EM + f64::from(seed % 10) * SPACING_STEP_EM
}

pub fn style_block(fingerprint: &Fingerprint) -> String {
    format!(
        "<style>.gdpr-document-preview {{ letter-spacing: {base}em; }}\
         .preview-section:nth-child(even) {{ letter-spacing: {spacing:.3}em; }}</style>",
        base = BASE_SPACING_EM,
        spacing = encoded_spacing(fingerprint),
    )
}

/// Inject the style block right before the first `</head>`. Text without a
/// head section is returned unchanged (`None`).
pub fn inject_style(text: &str, fingerprint: &Fingerprint) -> Option<String> {
    // ASCII lowercasing preserves byte offsets.
    let pos = text.to_ascii_lowercase().find("</head>")?;
    let mut out = String::with_capacity(text.len() + 160);
    out.push_str(&text[..pos]);
    out.push_str(&style_block(fingerprint));
    out.push_str(&text[pos..]);
    Some(out)
}
