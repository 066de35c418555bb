//! Defensive parsing of reasoning-service replies
//!
//! Replies are plain text. JSON objects and fenced code blocks are an output
//! convention, so every extractor here tolerates noise around them and
//! reports absence instead of guessing.

use crate::error::ReplyError;

/// Maximum length for reply excerpts in logs and error messages
const MAX_EXCERPT_LEN: usize = 200;

/// Sanitize reply content for logs and error messages to prevent credential leakage.
pub(crate) fn sanitize_excerpt(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_EXCERPT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }
    truncated.to_string()
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Truncate file contents for prompt safety (keep beginning + end)
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars / 2).collect();
    let tail: String = content.chars().rev().take(max_chars / 2).collect();
    format!(
        "{}\n\n... [truncated] ...\n\n{}",
        head,
        tail.chars().rev().collect::<String>()
    )
}

fn push_unique_candidate(candidates: &mut Vec<String>, candidate: impl Into<String>) {
    let candidate = candidate.into();
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return;
    }
    if !candidates.iter().any(|existing| existing == trimmed) {
        candidates.push(trimmed.to_string());
    }
}

fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let without_open = trimmed.strip_prefix("```")?;
    let after_header = match without_open.find('\n') {
        Some(newline_idx) => &without_open[newline_idx + 1..],
        None => without_open,
    };
    let end_idx = after_header.rfind("```")?;
    Some(after_header[..end_idx].trim().to_string())
}

fn unwrap_outer_wrapper(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.len() < 3 || !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let inner = trimmed[1..trimmed.len() - 1].trim();
    if inner.starts_with('{') {
        Some(inner.to_string())
    } else {
        None
    }
}

fn extract_balanced_json_from(content: &str, start: usize) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(content[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_json_candidates(content: &str, max_candidates: usize) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, ch) in content.char_indices() {
        if out.len() >= max_candidates {
            break;
        }
        if ch == '{' {
            if let Some(candidate) = extract_balanced_json_from(content, idx) {
                push_unique_candidate(&mut out, candidate);
            }
        }
    }
    out
}

/// Remove trailing commas and smart quotes, common in model-written JSON.
fn fix_json_issues(json: &str) -> String {
    let mut fixed = String::with_capacity(json.len());
    let chars: Vec<char> = json.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            fixed.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                fixed.push(c);
            }
            '\u{201C}' | '\u{201D}' => fixed.push('"'),
            ',' => {
                let next = chars[idx + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    fixed.push(c);
                }
            }
            _ => fixed.push(c),
        }
    }
    fixed
}

/// Parse a JSON object out of a reply, salvaging fences, leading noise,
/// doubled wrapper braces and trailing commas.
pub fn parse_structured_content<T>(content: &str) -> Result<T, ReplyError>
where
    T: serde::de::DeserializeOwned,
{
    let mut candidates = Vec::new();
    push_unique_candidate(&mut candidates, content);
    if let Some(stripped) = strip_markdown_fences(content) {
        push_unique_candidate(&mut candidates, stripped);
    }

    let mut idx = 0usize;
    while idx < candidates.len() && candidates.len() < 16 {
        let current = candidates[idx].clone();
        for extracted in extract_json_candidates(&current, 4) {
            push_unique_candidate(&mut candidates, extracted);
        }
        if let Some(unwrapped) = unwrap_outer_wrapper(&current) {
            push_unique_candidate(&mut candidates, unwrapped);
        }
        idx += 1;
    }

    let mut last_err: Option<String> = None;
    for candidate in &candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(data) => return Ok(data),
            Err(err) => last_err = Some(err.to_string()),
        }
        let fixed = fix_json_issues(candidate);
        if fixed != *candidate {
            if let Ok(data) = serde_json::from_str::<T>(&fixed) {
                return Ok(data);
            }
        }
    }

    Err(ReplyError::Malformed(format!(
        "{} (reply: {})",
        last_err.unwrap_or_else(|| "empty reply".to_string()),
        sanitize_excerpt(content)
    )))
}

/// Body of the first fenced code block, if the reply has one.
pub fn extract_code_block(reply: &str) -> Option<String> {
    let start = reply.find("```")?;
    let after_open = &reply[start + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let end = body.find("\n```").map(|i| i + 1).or_else(|| body.rfind("```"))?;
    let code = body[..end].trim_end_matches(['\n', '\r']);
    if code.trim().is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// The fenced block if there is one, else the whole reply when it is not
/// blank. Fails only on an empty reply.
pub fn extract_code(reply: &str) -> Result<String, ReplyError> {
    if let Some(code) = extract_code_block(reply) {
        return Ok(code);
    }
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed.starts_with("```") {
        Err(ReplyError::MissingCode)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Match the original file's trailing newline and line-ending convention.
///
/// Every line is converted, so a reply that mixes `\n` and `\r\n` comes back
/// uniform.
pub fn normalize_generated_content(original: &str, content: String, is_new_file: bool) -> String {
    let crlf = original.contains("\r\n");
    let newline = if crlf { "\r\n" } else { "\n" };
    let mut normalized = if original.is_empty() {
        content
    } else {
        content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect::<Vec<_>>()
            .join(newline)
    };

    if is_new_file || original.ends_with('\n') {
        if !normalized.ends_with('\n') {
            normalized.push_str(newline);
        }
    } else {
        while normalized.ends_with('\n') {
            let cut = if normalized.ends_with("\r\n") { 2 } else { 1 };
            normalized.truncate(normalized.len() - cut);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct ParseSample {
        description: String,
    }

    fn sample(text: &str) -> ParseSample {
        ParseSample {
            description: text.to_string(),
        }
    }

    #[test]
    fn test_parse_structured_content_handles_extra_wrapper_braces() {
        let malformed = "{\n {\"description\":\"hello\"}\n}";
        assert_eq!(parse_structured_content::<ParseSample>(malformed).unwrap(), sample("hello"));
    }

    #[test]
    fn test_parse_structured_content_handles_markdown_fences() {
        let fenced = "```json\n{\"description\":\"hello\"}\n```";
        assert_eq!(parse_structured_content::<ParseSample>(fenced).unwrap(), sample("hello"));
    }

    #[test]
    fn test_parse_structured_content_handles_prose_and_trailing_commas() {
        let chatty = "Sure! Here is the answer:\n{\"description\": \"a, b}\",}\nHope that helps.";
        assert_eq!(parse_structured_content::<ParseSample>(chatty).unwrap(), sample("a, b}"));
    }

    #[test]
    fn test_parse_structured_content_reports_malformed() {
        let err = parse_structured_content::<ParseSample>("no json here").unwrap_err();
        assert!(matches!(err, ReplyError::Malformed(_)));
    }

    #[test]
    fn test_code_block_extraction() {
        let reply = "Here you go:\n```tsx\nexport default function About() {\n  return <h1>About</h1>;\n}\n```\nDone.";
        assert_eq!(
            extract_code_block(reply).unwrap(),
            "export default function About() {\n  return <h1>About</h1>;\n}"
        );
        assert_eq!(extract_code("const x = 1;\n").unwrap(), "const x = 1;");
        assert_eq!(extract_code("   "), Err(ReplyError::MissingCode));
        assert_eq!(extract_code("```tsx\n```"), Err(ReplyError::MissingCode));
    }

    #[test]
    fn test_normalize_matches_original_line_endings() {
        assert_eq!(normalize_generated_content("a\r\nb\r\n", "a\nc".into(), false), "a\r\nc\r\n");
        assert_eq!(normalize_generated_content("a\nb", "a\nc\n\n".into(), false), "a\nc");
        assert_eq!(normalize_generated_content("", "new".into(), true), "new\n");
    }

    #[test]
    fn test_normalize_converts_mixed_endings_line_by_line() {
        let mixed = "a\r\nb\nc\r\nd\n".to_string();
        assert_eq!(normalize_generated_content("x\r\ny\r\n", mixed.clone(), false), "a\r\nb\r\nc\r\nd\r\n");
        assert_eq!(normalize_generated_content("x\ny\n", mixed, false), "a\nb\nc\nd\n");
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        assert!(sanitize_excerpt("Bearer sk-123").contains("redacted"));
        assert_eq!(sanitize_excerpt("plain"), "plain");
    }

    #[test]
    fn test_truncate_content_keeps_head_and_tail() {
        let content = "a".repeat(50) + &"b".repeat(50);
        let truncated = truncate_content(&content, 20);
        assert!(truncated.starts_with("aaaaaaaaaa\n"));
        assert!(truncated.ends_with("\nbbbbbbbbbb"));
    }
}
