//! Canonicalisation of recognised caption text.
//!
//! Captions always start with their class label and a colon (`VFX:` or
//! `DI:`), and OCR engines reliably mangle exactly that part: `VEX:`,
//! `D1;`, `01:`, a missing colon, and so on. [`normalize`] rewrites the
//! start of the text into the canonical prefix and leaves the payload alone.
//!
//! The rewrites are table-driven. Each class has an ordered list of literal
//! misreads that replace the prefix when the text starts with them, and a
//! list of look-alike labels that are accepted case-insensitively when
//! followed by whitespace, a delimiter, or nothing. The upper-case label
//! run straight into its payload (`VFXSH010`) only gets its colon back.
//! Text that matches none of these gets the canonical prefix prepended.
//!
//! Misreads are only matched at the start of the text. The same letters
//! later in the payload (`VFX:fix VEX: sky`) are left as they are.

use crate::classifier::MarkerClass;

/// Prefix rewrite rules for one class.
#[derive(Debug, Clone, Copy)]
pub struct PrefixRules {
    /// The prefix every normalised text starts with.
    pub canonical: &'static str,
    /// Literal misreads of the full prefix, tried in order.
    pub replacements: &'static [&'static str],
    /// Lower-case look-alikes of the bare label.
    pub confusables: &'static [&'static str],
}

impl PrefixRules {
    /// The canonical prefix without its colon.
    pub fn label(&self) -> &'static str {
        self.canonical.trim_end_matches(':')
    }
}

const VFX_RULES: PrefixRules = PrefixRules {
    canonical: "VFX:",
    replacements: &["VVFX:", "VEX:", "VFX;", "VEX;", "VFX.", "VEX.", "FX:"],
    confusables: &["vfx", "vex", "vpx", "vix"],
};

const DI_RULES: PrefixRules = PrefixRules {
    canonical: "DI:",
    replacements: &[
        "D1:", "D1;", "Di:", "Di;", "Dl:", "D|:", "DL:", "01:", "DI;", "Dl;", "D|;", "DL;", "01;",
    ],
    confusables: &["di", "d1", "dl", "d|", "ol", "oi", "01"],
};

const DELIMITERS: [char; 3] = [':', ';', '.'];

/// The rewrite table for `class`.
pub fn prefix_rules(class: MarkerClass) -> &'static PrefixRules {
    match class {
        MarkerClass::Vfx => &VFX_RULES,
        MarkerClass::Di => &DI_RULES,
    }
}

/// Rewrite the start of `text` into the canonical `CLASS:` prefix.
///
/// Never fails and never returns an empty string for non-empty input.
/// Applying it twice gives the same result as applying it once.
///
/// # Example
///
/// ```
/// use markscan::{MarkerClass, normalize};
///
/// assert_eq!(normalize("VEX:SHOT01", MarkerClass::Vfx), "VFX:SHOT01");
/// assert_eq!(normalize("D1;grade done", MarkerClass::Di), "DI:grade done");
/// assert_eq!(normalize("vfx sky replace", MarkerClass::Vfx), "VFX:sky replace");
/// assert_eq!(normalize("warm up", MarkerClass::Di), "DI:warm up");
/// ```
pub fn normalize(text: &str, class: MarkerClass) -> String {
    if text.is_empty() {
        return String::new();
    }

    let rules = prefix_rules(class);
    if text.starts_with(rules.canonical) {
        return text.to_string();
    }

    if let Some(payload) = rules
        .replacements
        .iter()
        .find_map(|misread| text.strip_prefix(misread))
    {
        return format!("{}{payload}", rules.canonical);
    }

    if let Some(payload) = strip_confusable(text, rules.confusables) {
        return format!("{}{payload}", rules.canonical);
    }

    // Upper-case label run straight into the payload, colon dropped.
    if let Some(payload) = text.strip_prefix(rules.label()) {
        return format!("{}{payload}", rules.canonical);
    }

    format!("{}{text}", rules.canonical)
}

/// If `text` starts with a look-alike label at a word boundary, return what
/// follows it, minus one delimiter and surrounding whitespace.
fn strip_confusable<'a>(text: &'a str, confusables: &[&str]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    let label = confusables.iter().find(|label| {
        lowered.starts_with(*label)
            && lowered[label.len()..]
                .chars()
                .next()
                .is_none_or(|next| next.is_whitespace() || DELIMITERS.contains(&next))
    })?;

    // Labels are ASCII, so the matched bytes line up with `text`.
    let rest = text.get(label.len()..)?.trim_start();
    let rest = rest
        .strip_prefix(|c: char| DELIMITERS.contains(&c))
        .unwrap_or(rest);
    Some(rest.trim_start())
}
