use regex::Regex;

use clausematch_core::error::{Error, Result};

// Leading enumeration markers: ①, ㉮, (1), (가), (a), 1), 가), a), "1. ", "가. ",
// "a. ", and bullets ("-" and "*" only when followed by whitespace). Several
// may be stacked ("1. ① ...").
const MARKER_PATTERN: &str = r"^\s*(?:(?:[\x{2460}-\x{24FF}\x{2776}-\x{2793}\x{3200}-\x{32FF}]|\(\s*(?:\d{1,3}|[가-힣]|[A-Za-z])\s*\)|(?:\d{1,3}|[가-하]|[A-Za-z])\)|(?:\d{1,3}|[가-하]|[A-Za-z])\.(?:\s|$)|[•·∙◦▪▫■□●○◆◇※]|[-*](?:\s|$))\s*)+";

/// Strips enumeration markers from clause sub-items.
#[derive(Debug, Clone)]
pub struct SubItemNormalizer {
    marker: Regex,
}

impl SubItemNormalizer {
    pub fn new() -> Result<Self> {
        let marker = Regex::new(MARKER_PATTERN).map_err(|e| Error::Operation(format!("marker pattern: {e}")))?;
        Ok(Self { marker })
    }

    /// Returns `None` when nothing but markers and whitespace remains.
    pub fn normalize(&self, text: &str) -> Option<String> {
        let stripped = self.marker.replace(text, "");
        let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() { None } else { Some(collapsed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_common_markers() {
        let n = SubItemNormalizer::new().unwrap();
        let cases = [
            ("① 개인정보를 처리한다", "개인정보를 처리한다"),
            ("1. The term is one year", "The term is one year"),
            ("2) notice in writing", "notice in writing"),
            ("(3) renewal", "renewal"),
            ("(가) 위탁업무의 내용", "위탁업무의 내용"),
            ("나. 보유기간", "보유기간"),
            ("(a) first", "first"),
            ("b) second", "second"),
            ("- bullet item", "bullet item"),
            ("1. ② stacked", "stacked"),
            ("  spaced   out\ttext  ", "spaced out text"),
        ];
        for (input, want) in cases {
            assert_eq!(n.normalize(input).as_deref(), Some(want), "input: {input:?}");
        }
    }

    #[test]
    fn keeps_numbers_that_are_content() {
        let n = SubItemNormalizer::new().unwrap();
        assert_eq!(n.normalize("1.5% late fee").as_deref(), Some("1.5% late fee"));
        assert_eq!(n.normalize("30 days notice").as_deref(), Some("30 days notice"));
        assert_eq!(n.normalize("-5 days from delivery").as_deref(), Some("-5 days from delivery"));
        assert_eq!(n.normalize("*optional extras").as_deref(), Some("*optional extras"));
    }

    #[test]
    fn marker_only_is_none() {
        let n = SubItemNormalizer::new().unwrap();
        assert_eq!(n.normalize("①"), None);
        assert_eq!(n.normalize("(1)  "), None);
        assert_eq!(n.normalize(""), None);
    }
}
