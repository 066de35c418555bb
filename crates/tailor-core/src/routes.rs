//! Route table handling for the root composition file
//!
//! A new page gets exactly one `<Route>` entry; every existing route must
//! survive the update.

use crate::snapshot::{contains_token, is_import_line};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteUpdateError {
    #[error("existing route(s) removed: {0:?}")]
    MissingRoutes(Vec<String>),
    #[error("expected {expected} route entries, found {actual}")]
    UnexpectedRouteCount { expected: usize, actual: usize },
    #[error("update does not reference `{0}`")]
    MissingReference(String),
}

/// Trimmed lines that open a `<Route` element.
pub fn route_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| is_route_open(line))
        .map(str::to_string)
        .collect()
}

fn is_route_open(trimmed: &str) -> bool {
    trimmed.starts_with("<Route ") || trimmed.starts_with("<Route>") || trimmed == "<Route"
}

pub fn has_route_table(content: &str) -> bool {
    content.lines().any(|line| is_route_open(line.trim()))
}

/// Check that `updated` adds exactly one route for `component_name`.
pub fn verify_route_update(
    original: &str,
    updated: &str,
    component_name: &str,
) -> Result<(), RouteUpdateError> {
    let before = route_lines(original);
    let after = route_lines(updated);

    let missing: Vec<String> = before
        .iter()
        .filter(|line| !after.contains(line))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(RouteUpdateError::MissingRoutes(missing));
    }
    if after.len() != before.len() + 1 {
        return Err(RouteUpdateError::UnexpectedRouteCount {
            expected: before.len() + 1,
            actual: after.len(),
        });
    }
    if !contains_token(updated, component_name) {
        return Err(RouteUpdateError::MissingReference(component_name.to_string()));
    }
    Ok(())
}

/// Insert one import and one route entry without any external help.
///
/// The import goes after the last import line; the route after the end of
/// the last existing route element, with the same indentation. The element
/// style (`element={<X />}` vs `component={X}`) follows the existing routes.
/// Returns `None` when the file has no route table.
pub fn insert_route(
    content: &str,
    component_name: &str,
    import_path: &str,
    route_path: &str,
) -> Option<String> {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let last_route_start = lines.iter().rposition(|l| is_route_open(l.trim()))?;
    let last_route_end = route_end_line(&lines, last_route_start)?;

    let indent: String = lines[last_route_start]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let uses_component_prop = lines
        .iter()
        .any(|l| is_route_open(l.trim()) && l.contains("component={"));
    let route = if uses_component_prop {
        format!(
            "{}<Route path=\"{}\" component={{{}}} />",
            indent, route_path, component_name
        )
    } else {
        format!(
            "{}<Route path=\"{}\" element={{<{} />}} />",
            indent, route_path, component_name
        )
    };
    lines.insert(last_route_end + 1, route);

    let import = format!("import {} from '{}';", component_name, import_path);
    let import_at = lines
        .iter()
        .rposition(|l| is_import_line(l.trim_start()))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    lines.insert(import_at, import);

    let mut updated = lines.join(newline);
    if content.ends_with('\n') {
        updated.push_str(newline);
    }
    Some(updated)
}

/// Line on which the route element opened at `start` closes.
///
/// The opening tag ends at the first `>` outside `{...}`; a self-closing tag
/// ends there, otherwise the element runs to the next `</Route>`.
fn route_end_line(lines: &[String], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut prev = ' ';
    let mut open_tag_closed = false;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        if open_tag_closed {
            if line.contains("</Route>") {
                return Some(idx);
            }
            continue;
        }
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    if prev == '/' {
                        return Some(idx);
                    }
                    open_tag_closed = true;
                }
                _ => {}
            }
            prev = c;
        }
        if open_tag_closed && line.contains("</Route>") {
            return Some(idx);
        }
    }
    None
}

/// `ContactUs` -> `/contact-us`
pub fn route_path_for(component_name: &str) -> String {
    let mut path = String::from("/");
    for (idx, c) in component_name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if idx > 0 && !path.ends_with('-') {
                path.push('-');
            }
            path.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            path.push(c);
        } else if !path.ends_with('-') && path.len() > 1 {
            path.push('-');
        }
    }
    path
}

/// Extension-less import specifier from one project file to another.
pub fn relative_import(from_file: &str, to_file: &str) -> String {
    let from_dir: Vec<&str> = match from_file.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target = match to_file.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => to_file,
    };
    let target_parts: Vec<&str> = target.split('/').collect();

    let common = from_dir
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from_dir.len() - common;
    let rest = target_parts[common..].join("/");
    if ups == 0 {
        format!("./{}", rest)
    } else {
        format!("{}{}", "../".repeat(ups), rest)
    }
}
