use super::parse::{truncate_content, truncate_str};
use tailor_core::{ComponentType, HeuristicSuggestion, StructuralNode, Strategy};

// Task tags open every prompt so a reply can always be traced to its stage.
pub const CLASSIFY_TASK: &str = "TASK: CLASSIFY_REQUEST";
pub const RELEVANCE_TASK: &str = "TASK: SCORE_FILE_RELEVANCE";
pub const NODE_EDIT_TASK: &str = "TASK: EDIT_NODES";
pub const FULL_FILE_TASK: &str = "TASK: REWRITE_FILE";
pub const COMPONENT_TASK: &str = "TASK: CREATE_COMPONENT";
pub const ROUTE_UPDATE_TASK: &str = "TASK: UPDATE_ROUTES";

/// Byte budget for the node listing of one file when scoring relevance
const MAX_NODE_LISTING_BYTES: usize = 12_000;
const MAX_SNIPPET_CHARS: usize = 600;
/// Largest source text sent whole for an edit; larger targets are refused
pub const MAX_EDIT_SOURCE_BYTES: usize = 64 * 1024;
const MAX_SCORING_CONTENT_CHARS: usize = 6000;
const MAX_CONTEXT_CHARS: usize = 1500;

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

const CODE_RULES: &str = r#"CODE RULES:
- Keep every existing import and export unless the request removes it.
- Keep the component's name and its default export.
- Preserve indentation and surrounding style.
- No placeholders, ellipses, or line numbers.
- Change only what the request needs."#;

const STRATEGIES: &str = r#"STRATEGIES:
- NODE_EDIT: small, local changes to existing elements (text, colors, classes, props, a single handler).
- FULL_FILE: broad changes to one existing file (restructure a layout, restyle a whole page, add several sections).
- COMPONENT_ADDITION: the request asks for something new that deserves its own file (a new page, a new reusable component)."#;

fn optional_section(heading: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        String::new()
    } else {
        format!("\n\n{}:\n{}", heading, truncate_str(body, MAX_CONTEXT_CHARS))
    }
}

fn fence_language(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("tsx") => "tsx",
        Some("ts") => "ts",
        Some("jsx") => "jsx",
        _ => "js",
    }
}

/// Lowercase words of the request worth matching against node text.
fn request_terms(request: &str) -> Vec<String> {
    let mut terms: Vec<String> = request
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= 3)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn term_hits(node: &StructuralNode, terms: &[String]) -> usize {
    let snippet = node.code_snippet.to_lowercase();
    let name = node.name.as_deref().unwrap_or("").to_lowercase();
    terms
        .iter()
        .filter(|term| snippet.contains(term.as_str()) || name.contains(term.as_str()))
        .count()
}

/// List nodes within the byte budget.
///
/// Nodes sharing more words with the request are kept first (document order
/// breaks ties); the kept nodes are then listed in document order.
fn format_nodes(request: &str, nodes: &[StructuralNode]) -> String {
    let terms = request_terms(request);
    let mut ranked: Vec<(usize, &StructuralNode)> = nodes.iter().enumerate().collect();
    ranked.sort_by_key(|(_, node)| std::cmp::Reverse(term_hits(node, &terms)));

    let mut kept: Vec<(usize, String)> = Vec::new();
    let mut used = 0;
    for (position, node) in ranked {
        let entry = format!(
            "[{}] {} lines {}-{}\n{}\n\n",
            node.id,
            node.kind.label(),
            node.start_line,
            node.end_line,
            truncate_str(&node.code_snippet, MAX_SNIPPET_CHARS)
        );
        if used + entry.len() > MAX_NODE_LISTING_BYTES {
            continue;
        }
        used += entry.len();
        kept.push((position, entry));
    }
    kept.sort_by_key(|(position, _)| *position);

    let omitted = nodes.len() - kept.len();
    let mut listing: String = kept.into_iter().map(|(_, entry)| entry).collect();
    if omitted > 0 {
        listing.push_str(&format!("... {} more nodes not shown\n", omitted));
    }
    listing
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn classify_prompt(
    request: &str,
    project_summary: &str,
    conversation_context: &str,
    suggestion: &HeuristicSuggestion,
) -> String {
    format!(
        r#"{task}

Decide how to carry out a change request on a JSX/TSX project.

{strategies}

REQUEST:
{request}{project}{history}

KEYWORD HEURISTIC: {suggested} (confidence {confidence}/100). It only sees keywords; decide on the request itself.

OUTPUT (JSON object only):
{{
  "strategy": "NODE_EDIT" | "FULL_FILE" | "COMPONENT_ADDITION",
  "reasoning": "one or two sentences",
  "componentName": "PascalCase name, only for COMPONENT_ADDITION",
  "componentType": "page" | "component", only for COMPONENT_ADDITION
}}"#,
        task = CLASSIFY_TASK,
        strategies = STRATEGIES,
        request = request.trim(),
        project = optional_section("PROJECT FILES", project_summary),
        history = optional_section("CONVERSATION CONTEXT", conversation_context),
        suggested = suggestion.strategy,
        confidence = suggestion.confidence,
    )
}

pub fn relevance_prompt(
    request: &str,
    strategy: Strategy,
    file_path: &str,
    content: &str,
    nodes: &[StructuralNode],
    project_context: &str,
) -> String {
    let (body, target_rule) = if strategy.targets_nodes() {
        (
            format!("NODES:\n{}", format_nodes(request, nodes)),
            "List in targetNodeIds the ids of the nodes that must change. Use only ids shown above.",
        )
    } else {
        (
            format!(
                "CONTENT:\n```{}\n{}\n```",
                fence_language(file_path),
                truncate_content(content, MAX_SCORING_CONTENT_CHARS)
            ),
            "Leave targetNodeIds empty.",
        )
    };

    format!(
        r#"{task}

Score how relevant one file is to a change request, from 0 (unrelated) to 100 (this is the file to change).
Strategy: {strategy}

REQUEST:
{request}{project}

FILE: {file_path}
{body}

{target_rule}

OUTPUT (JSON object only):
{{
  "isRelevant": true | false,
  "score": 0-100,
  "reasoning": "one sentence",
  "targetNodeIds": ["node id", ...]
}}"#,
        task = RELEVANCE_TASK,
        strategy = strategy,
        request = request.trim(),
        project = optional_section("PROJECT", project_context),
    )
}

pub fn node_edit_prompt(request: &str, reasoning: &str, file_path: &str, nodes: &[StructuralNode]) -> String {
    let mut listing = String::new();
    for node in nodes {
        listing.push_str(&format!(
            "[{}] lines {}-{}\n```{}\n{}\n```\n\n",
            node.id,
            node.start_line,
            node.end_line,
            fence_language(file_path),
            node.code_snippet
        ));
    }

    format!(
        r#"{task}

Rewrite the listed nodes of {file_path} to satisfy the request. Each replacement replaces the
whole node text exactly as shown, so include the node's opening and closing parts.

REQUEST:
{request}{why}

NODES:
{listing}{rules}

OUTPUT (JSON object only):
{{
  "replacements": [
    {{ "nodeId": "id from the list", "code": "full replacement text for that node" }}
  ]
}}
Leave out nodes that do not need to change."#,
        task = NODE_EDIT_TASK,
        request = request.trim(),
        why = optional_section("WHY THESE NODES", reasoning),
        rules = CODE_RULES,
    )
}

pub fn full_file_prompt(request: &str, reasoning: &str, file_path: &str, content: &str) -> String {
    format!(
        r#"{task}

Rewrite {file_path} to satisfy the request.

REQUEST:
{request}{why}

CURRENT CONTENT:
```{lang}
{content}
```

{rules}

OUTPUT: the complete new file in one fenced code block, nothing else."#,
        task = FULL_FILE_TASK,
        request = request.trim(),
        why = optional_section("CONTEXT", reasoning),
        lang = fence_language(file_path),
        rules = CODE_RULES,
    )
}

pub fn component_prompt(
    name: &str,
    component_type: ComponentType,
    file_path: &str,
    request: &str,
    reasoning: &str,
    style_sample: Option<&str>,
) -> String {
    let sample = style_sample
        .map(|sample| {
            format!(
                "\n\nEXISTING CODE FOR STYLE REFERENCE:\n```{}\n{}\n```",
                fence_language(file_path),
                truncate_content(sample, MAX_SCORING_CONTENT_CHARS / 2)
            )
        })
        .unwrap_or_default();

    format!(
        r#"{task}

Create a new {component_type} named {name} at {file_path}.

REQUEST:
{request}{why}{sample}

RULES:
- Export the component as the default export: `export default function {name}`.
- Self-contained: import only React and packages the sample already uses.
- No placeholders or TODO markers.

OUTPUT: the complete file in one fenced code block, nothing else."#,
        task = COMPONENT_TASK,
        request = request.trim(),
        why = optional_section("CONTEXT", reasoning),
    )
}

pub fn route_update_prompt(
    root_path: &str,
    root_content: &str,
    name: &str,
    import_path: &str,
    route_path: &str,
) -> String {
    format!(
        r#"{task}

Register the new page {name} in {root_path}.
- Add `import {name} from '{import_path}';` next to the other imports.
- Add a route for path "{route_path}" rendering {name}, next to the existing routes and in the same style.
- Change nothing else. Every existing route must remain.

CURRENT CONTENT:
```{lang}
{root_content}
```

OUTPUT: the complete updated file in one fenced code block, nothing else."#,
        task = ROUTE_UPDATE_TASK,
        lang = fence_language(root_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailor_core::heuristics::suggest_strategy;
    use tailor_core::parse_for_path;
    use std::path::Path;

    #[test]
    fn every_prompt_opens_with_its_task_tag() {
        assert!(classify_prompt("make it red", "", "", &suggest_strategy("make it red")).starts_with(CLASSIFY_TASK));
        assert!(full_file_prompt("x", "", "src/App.tsx", "code").starts_with(FULL_FILE_TASK));
        assert!(component_prompt("About", ComponentType::Page, "src/pages/About.tsx", "x", "", None)
            .starts_with(COMPONENT_TASK));
        assert!(route_update_prompt("src/App.tsx", "", "About", "./pages/About", "/about")
            .starts_with(ROUTE_UPDATE_TASK));
    }

    #[test]
    fn empty_context_sections_are_left_out() {
        let suggestion = suggest_strategy("make it red");
        let prompt = classify_prompt("make it red", "  ", "", &suggestion);
        assert!(!prompt.contains("PROJECT FILES"));
        assert!(!prompt.contains("CONVERSATION CONTEXT"));
        let prompt = classify_prompt("make it red", "src/App.tsx", "Previous request", &suggestion);
        assert!(prompt.contains("PROJECT FILES:\nsrc/App.tsx"));
    }

    #[test]
    fn node_listing_shows_ids_and_spans() {
        let content = "export default function App() {\n  return <button>Sign up</button>;\n}\n";
        let nodes = parse_for_path(Path::new("src/App.tsx"), content);
        let prompt = relevance_prompt("make the button red", Strategy::NodeEdit, "src/App.tsx", content, &nodes, "");
        assert!(prompt.starts_with(RELEVANCE_TASK));
        for node in &nodes {
            assert!(prompt.contains(&format!("[{}]", node.id)));
        }
    }

    #[test]
    fn long_node_listings_keep_the_nodes_the_request_names() {
        let mut content = String::from("export default function Page() {\n  return (\n    <main>\n");
        for i in 0..400 {
            content.push_str(&format!("      <p className=\"filler\">Paragraph number {} of the page body</p>\n", i));
        }
        content.push_str("      <button className=\"checkout\">Checkout</button>\n    </main>\n  );\n}\n");
        let nodes = parse_for_path(Path::new("src/Page.tsx"), &content);
        let checkout = nodes
            .iter()
            .find(|node| node.code_snippet.starts_with("<button"))
            .unwrap();

        let prompt = relevance_prompt("make the checkout button green", Strategy::NodeEdit, "src/Page.tsx", &content, &nodes, "");

        let listing = &prompt[prompt.find("NODES:").unwrap()..prompt.find("List in targetNodeIds").unwrap()];
        assert!(listing.len() <= MAX_NODE_LISTING_BYTES + 64);
        assert!(listing.contains(&format!("[{}]", checkout.id)));
        assert!(listing.contains("more nodes not shown"));
    }

    #[test]
    fn whole_file_scoring_shows_content_not_nodes() {
        let prompt = relevance_prompt("restyle", Strategy::FullFile, "src/App.jsx", "const a = 1;", &[], "");
        assert!(prompt.contains("```jsx\nconst a = 1;\n```"));
        assert!(prompt.contains("Leave targetNodeIds empty."));
    }
}
