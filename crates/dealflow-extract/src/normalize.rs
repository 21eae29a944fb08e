//! Repairs rendering and OCR artifacts in extracted text
//!
//! Rules run in a fixed order; later rules rely on the whitespace shape the
//! earlier ones leave behind:
//!
//! 1. whitespace runs collapse to one space (a run holding two or more
//!    newlines becomes a single paragraph break)
//! 2. letter-spaced words (`A c m e`) are joined
//! 3. a newline plus indentation, or a bare mid-paragraph newline, becomes a space
//! 4. hyphens split from their word are re-attached
//! 5. em/en dashes and spaced hyphens become one unspaced hyphen
//!
//! The result is trimmed. `normalize(normalize(x)) == normalize(x)`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// Three or more single-character word tokens separated by single whitespace characters
static LETTER_SPACED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\b(?:\s\w\b){2,}").unwrap());

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n|\n[ \t]+|\n").unwrap());

static SPACE_BEFORE_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)[ \t]+-").unwrap());

static SPACE_AFTER_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-[ \t]+(\w)").unwrap());

static DASH_VARIANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*[\x{2012}-\x{2015}][ \t]*").unwrap());

static SPACED_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+-[ \t]+").unwrap());

const PARAGRAPH_BREAK: &str = "\n\n";

/// Clean raw extracted text into coherent prose
pub fn normalize_text(text: &str) -> String {
    let text = collapse_whitespace(text);
    let text = join_letter_spacing(&text);
    let text = unwrap_lines(&text);
    let text = attach_hyphens(&text);
    let text = normalize_dashes(&text);
    text.trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(text, |caps: &Captures| {
            if caps[0].matches('\n').count() >= 2 {
                PARAGRAPH_BREAK
            } else {
                " "
            }
        })
        .into_owned()
}

fn join_letter_spacing(text: &str) -> String {
    LETTER_SPACED
        .replace_all(text, |caps: &Captures| {
            caps[0].chars().filter(|c| !c.is_whitespace()).collect::<String>()
        })
        .into_owned()
}

fn unwrap_lines(text: &str) -> String {
    LINE_BREAK
        .replace_all(text, |caps: &Captures| {
            if &caps[0] == PARAGRAPH_BREAK {
                PARAGRAPH_BREAK
            } else {
                " "
            }
        })
        .into_owned()
}

fn attach_hyphens(text: &str) -> String {
    let text = SPACE_BEFORE_HYPHEN.replace_all(text, "${1}-");
    SPACE_AFTER_HYPHEN.replace_all(&text, "-${1}").into_owned()
}

fn normalize_dashes(text: &str) -> String {
    let text = DASH_VARIANT.replace_all(text, "-");
    SPACED_HYPHEN.replace_all(&text, "-").into_owned()
}
