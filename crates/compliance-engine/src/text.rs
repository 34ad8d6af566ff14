//! Text normalization used by every value and content comparison.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Leading paragraph line number, e.g. "12 本基金…" or "（三）…".
    pub static ref P_LINE_NUMBER: Regex =
        Regex::new(r"(?P<number>^\s*[(（【]?\s*([➢0-9一二三四五六七八九十]+|[a-zA-Z]{1,2})\s*[)）】,.，、\s]+\s*|^[➢]+)")
            .unwrap();
    /// List/paragraph numbering prefixes ignored for similarity.
    static ref P_NUMBERING: Vec<Regex> = vec![
        Regex::new(r"^[(（【]?[a-zA-Z]+\s*[\.．、)）】]").unwrap(),
        Regex::new(r"^\s*[(（【]?\s*[➢0-9一二三四五六七八九十]+\s*[)）】]").unwrap(),
        Regex::new(r"^\s*[(（【]?\s*[➢0-9一二三四五六七八九十]+\s*[,.．，、\s]+[)）】]?\s*").unwrap(),
        Regex::new(r"^\s*[➢✓✔■○·]+\s*").unwrap(),
        Regex::new(r"^\s*第\s*[0-9一二三四五六七八九十]+\s*(部分|章?节?)").unwrap(),
    ];
}

/// Characters carrying no content weight in similarity comparison.
const JUNK_CHARS: &str = "。．.;；？?:：！!、，,《》<>()（）{}[]【】［］」「〗〖』『〉〈»«＞＜〕〔“”\"'‘’\n";

/// Normalize text for comparison: fold full-width ASCII to half-width and
/// drop all whitespace. Idempotent.
pub fn clean(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(fold_width)
        .collect()
}

fn fold_width(c: char) -> char {
    match c {
        '\u{ff01}'..='\u{ff5e}' => char::from_u32(c as u32 - 0xff01 + 0x21).unwrap_or(c),
        _ => c,
    }
}

/// Strip a leading list/paragraph numbering prefix.
pub fn strip_numbering(text: &str) -> String {
    for pattern in P_NUMBERING.iter() {
        if let Some(matched) = pattern.find(text) {
            if matched.start() == 0 {
                return text[matched.end()..].to_string();
            }
        }
    }
    text.to_string()
}

/// Drop punctuation and bracket characters for ratio computation.
pub fn strip_junk(text: &str) -> String {
    text.chars().filter(|c| !JUNK_CHARS.contains(*c)).collect()
}

/// Join an optional addition onto an accumulated text, skipping empties.
pub fn append_suggestion(
    current: Option<String>,
    addition: Option<&str>,
    separator: &str,
) -> Option<String> {
    let current = current.filter(|text| !text.is_empty());
    let addition = addition.filter(|text| !text.is_empty());
    match (current, addition) {
        (current, None) => current,
        (None, Some(addition)) => Some(addition.to_string()),
        (Some(current), Some(addition)) => Some(format!("{}{}{}", current, separator, addition)),
    }
}

pub fn is_empty(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(text) => text.is_empty(),
    }
}

/// Replace every synonym with the head word of its equivalence class.
/// Longer words are substituted first so that a word containing the head
/// word ("应当" vs "应") is not rewritten twice.
pub fn replace_synonym(synonyms: &[Vec<String>], text: &str) -> String {
    if synonyms.is_empty() || text.is_empty() {
        return text.to_string();
    }
    let mut text = text.to_string();
    for (class_index, words) in synonyms.iter().enumerate() {
        let Some(base_word) = words.first() else {
            continue;
        };
        let marker = format!("\u{1}{}\u{1}", class_index);
        let mut ordered: Vec<&String> = words.iter().filter(|word| !word.is_empty()).collect();
        ordered.sort_by_key(|word| std::cmp::Reverse(word.chars().count()));
        for word in ordered {
            text = text.replace(word.as_str(), &marker);
        }
        text = text.replace(&marker, base_word);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_removes_whitespace_and_folds_width() {
        assert_eq!(clean(" 基金 管理人　应当 "), "基金管理人应当");
        assert_eq!(clean("ＡＢＣ１２３％"), "ABC123%");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean("１２  个 月");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn test_strip_numbering() {
        assert_eq!(strip_numbering("（三）基金托管人"), "基金托管人");
        assert_eq!(strip_numbering("12、基金托管人"), "基金托管人");
        assert_eq!(strip_numbering("基金托管人"), "基金托管人");
    }

    #[test]
    fn test_line_number_pattern() {
        let caps = P_LINE_NUMBER.captures("12 本基金为契约型基金").unwrap();
        assert_eq!(caps.name("number").unwrap().as_str(), "12 ");
    }

    #[test]
    fn test_replace_synonym_uses_head_word() {
        let synonyms = vec![vec!["应当".to_string(), "应".to_string()]];
        assert_eq!(replace_synonym(&synonyms, "管理人应勤勉"), "管理人应当勤勉");
        // 已经是基准词的不再替换
        assert_eq!(replace_synonym(&synonyms, "管理人应当勤勉"), "管理人应当勤勉");
    }

    #[test]
    fn test_is_empty() {
        assert!(is_empty(None));
        assert!(is_empty(Some("")));
        assert!(!is_empty(Some("0")));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn clean_idempotent(text in "\\PC{0,40}") {
                let once = clean(&text);
                prop_assert_eq!(clean(&once), once);
            }
        }
    }
}
