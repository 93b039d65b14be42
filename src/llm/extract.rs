use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n?(.*?)```").unwrap()
});

static LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*SQL\s*Query\s*:\s*").unwrap()
});

/// Normalizes model output into the text that gets executed.
///
/// Only removes wrapping: surrounding whitespace, one markdown code fence, a
/// leading `SQLQuery:` label, and anything from a `SQLResult:` line onwards.
/// The statement itself is never rewritten.
pub fn clean_sql(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(captures) = FENCE_REGEX.captures(text) {
        if let Some(body) = captures.get(1) {
            debug!("Stripped markdown fence from model output");
            text = body.as_str();
        }
    } else {
        // The chain prompt may open the fence itself, leaving only one half
        text = text.strip_suffix("```").unwrap_or(text);
        if let Some(rest) = text.strip_prefix("```") {
            text = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        }
    }

    let text = LABEL_REGEX.replace(text, "");
    let text = match text.find("SQLResult:") {
        Some(idx) => &text[..idx],
        None => &text[..],
    };

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sql_is_only_trimmed() {
        assert_eq!(
            clean_sql("\n  SELECT COUNT(*) FROM Patients WHERE Gender = 'Male';  \n"),
            "SELECT COUNT(*) FROM Patients WHERE Gender = 'Male';"
        );
    }

    #[test]
    fn test_fenced_sql() {
        let raw = "Here you go:\n```sql\nSELECT FirstName\nFROM Patients;\n```\nLet me know!";
        assert_eq!(clean_sql(raw), "SELECT FirstName\nFROM Patients;");
    }

    #[test]
    fn test_fence_without_language() {
        assert_eq!(clean_sql("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_closing_fence_only() {
        assert_eq!(clean_sql("SELECT 1;\n```"), "SELECT 1;");
    }

    #[test]
    fn test_chain_labels() {
        let raw = "SQLQuery: SELECT TOP 5 Diagnosis FROM Patients\nSQLResult: [(...)]\nAnswer: ...";
        assert_eq!(clean_sql(raw), "SELECT TOP 5 Diagnosis FROM Patients");
    }

    #[test]
    fn test_inner_backticks_untouched() {
        // Only a wrapping fence is removed, quoted identifiers stay as-is
        assert_eq!(clean_sql("SELECT `Gender` FROM Patients"), "SELECT `Gender` FROM Patients");
    }
}
