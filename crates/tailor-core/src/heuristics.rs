//! Offline request heuristics
//!
//! Keyword families and length priors that suggest a strategy without any
//! external call, plus the string heuristics used to name new components.

use crate::scope::{ComponentType, Strategy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Placeholder when no name can be pulled out of a request.
pub const DEFAULT_COMPONENT_NAME: &str = "NewComponent";

/// Name used by the emergency stub when the request has nothing usable.
pub const EMERGENCY_COMPONENT_NAME: &str = "CustomComponent";

const CREATION_PHRASES: &[(&str, u32)] = &[
    ("add a new", 35),
    ("add new", 35),
    ("create a", 35),
    ("create new", 35),
    ("create an", 35),
    ("build a", 25),
    ("generate a", 25),
    ("new page", 30),
    ("new component", 30),
    ("new screen", 30),
    ("new section", 20),
];

const CREATION_NOUNS: &[&str] = &["page", "component", "screen", "section", "modal", "form", "view"];

const NODE_EDIT_PHRASES: &[(&str, u32)] = &[
    ("make the", 15),
    ("change the", 15),
    ("rename", 20),
    ("button", 20),
    ("color", 25),
    ("colour", 25),
    ("text", 20),
    ("label", 20),
    ("title", 15),
    ("heading", 15),
    ("font size", 20),
    ("padding", 15),
    ("margin", 15),
    ("icon", 15),
    ("link", 10),
    ("placeholder", 15),
    ("bigger", 15),
    ("smaller", 15),
    ("bold", 15),
];

const COLOR_WORDS: &[&str] = &[
    "red", "blue", "green", "yellow", "orange", "purple", "pink", "black", "white", "gray", "grey",
];

const FULL_FILE_PHRASES: &[(&str, u32)] = &[
    ("layout", 30),
    ("theme", 30),
    ("dark mode", 35),
    ("redesign", 35),
    ("restructure", 35),
    ("refactor", 30),
    ("responsive", 25),
    ("entire", 25),
    ("whole", 25),
    ("every", 20),
    ("all ", 20),
    ("overall", 20),
    ("multiple", 20),
    ("throughout", 20),
];

const SHORT_REQUEST_WORDS: usize = 8;
const LONG_REQUEST_WORDS: usize = 25;
const LENGTH_PRIOR: u32 = 15;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "and", "or", "for", "in", "on", "at", "with", "by", "is", "it",
    "this", "that", "my", "our", "your", "new", "some", "please", "can", "you", "me", "be", "from",
    "into", "simple", "basic",
];

const ACTION_WORDS: &[&str] = &[
    "add", "create", "make", "change", "update", "build", "generate", "set", "put", "show", "use",
    "remove", "replace", "move", "fix",
];

/// Points per strategy bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketScores {
    pub node_edit: u32,
    pub full_file: u32,
    pub component_addition: u32,
}

impl BucketScores {
    pub fn total(&self) -> u32 {
        self.node_edit + self.full_file + self.component_addition
    }

    pub fn get(&self, strategy: Strategy) -> u32 {
        match strategy {
            Strategy::NodeEdit => self.node_edit,
            Strategy::FullFile => self.full_file,
            Strategy::ComponentAddition => self.component_addition,
        }
    }
}

/// The heuristic's suggestion and how sure it is (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicSuggestion {
    pub strategy: Strategy,
    pub confidence: u8,
    pub scores: BucketScores,
}

/// Score a request into the three strategy buckets.
pub fn score_request(request: &str) -> BucketScores {
    let lower = format!("{} ", request.to_lowercase());
    let words = words(&lower);
    let mut scores = BucketScores::default();

    let mut creation_verb = false;
    for (phrase, points) in CREATION_PHRASES {
        if lower.contains(phrase) {
            scores.component_addition += points;
            creation_verb = true;
        }
    }
    if creation_verb && words.iter().any(|w| CREATION_NOUNS.contains(w)) {
        scores.component_addition += 25;
    }

    for (phrase, points) in NODE_EDIT_PHRASES {
        if lower.contains(phrase) {
            scores.node_edit += points;
        }
    }
    if words.iter().any(|w| COLOR_WORDS.contains(w)) {
        scores.node_edit += 25;
    }

    for (phrase, points) in FULL_FILE_PHRASES {
        if lower.contains(phrase) {
            scores.full_file += points;
        }
    }

    if words.len() <= SHORT_REQUEST_WORDS {
        scores.node_edit += LENGTH_PRIOR;
    } else if words.len() > LONG_REQUEST_WORDS {
        scores.full_file += LENGTH_PRIOR;
    }

    scores
}

/// Suggest a strategy for a request with a 0-100 confidence.
///
/// Confidence grows with both the winner's share of all points and its
/// absolute strength, so a lone weak signal never reads as certain. Ties go
/// to the less destructive strategy (node edit, then full file).
pub fn suggest_strategy(request: &str) -> HeuristicSuggestion {
    let scores = score_request(request);
    let total = scores.total();
    if total == 0 {
        return HeuristicSuggestion {
            strategy: Strategy::NodeEdit,
            confidence: 0,
            scores,
        };
    }

    let mut strategy = Strategy::NodeEdit;
    for candidate in Strategy::ALL {
        if scores.get(candidate) > scores.get(strategy) {
            strategy = candidate;
        }
    }

    let winner = scores.get(strategy) as f64;
    let share = winner / total as f64;
    let confidence = share * (50.0 + 0.5 * winner.min(100.0));

    HeuristicSuggestion {
        strategy,
        confidence: confidence.round().clamp(0.0, 100.0) as u8,
        scores,
    }
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lowercase content words of a request, for matching against files.
pub fn request_terms(request: &str) -> Vec<String> {
    let lower = request.to_lowercase();
    let mut terms: Vec<String> = Vec::new();
    for word in words(&lower) {
        if word.len() >= 3
            && !STOPWORDS.contains(&word)
            && !ACTION_WORDS.contains(&word)
            && !terms.iter().any(|t| t == word)
        {
            terms.push(word.to_string());
        }
    }
    terms
}

fn component_name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)\b(?:called|named)\s+["'`]?([A-Za-z][\w-]*(?:\s+[A-Z][\w-]*)?)"#,
            r"(?i)\b(?:add|create|build|make|generate|new)\s+(?:a\s+|an\s+|the\s+)?(?:new\s+)?([A-Za-z][\w-]*(?:\s+[A-Za-z][\w-]*)?)\s+(?:page|component|screen|section|view|modal|form)\b",
            r"(?i)\b(?:page|component|screen)\s+for\s+(?:the\s+)?([A-Za-z][\w-]*)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Pull a PascalCase component name out of a creation request.
pub fn derive_component_name(request: &str) -> String {
    component_name_patterns()
        .iter()
        .filter_map(|re| re.captures(request).and_then(|caps| caps.get(1)))
        .map(|m| {
            let kept: Vec<&str> = m
                .as_str()
                .split_whitespace()
                .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
                .collect();
            to_pascal_case(&kept.join(" "))
        })
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_COMPONENT_NAME.to_string())
}

/// Page vs reusable component, from keyword presence.
pub fn infer_component_type(request: &str) -> ComponentType {
    let lower = request.to_lowercase();
    let is_page = words(&lower)
        .iter()
        .any(|w| matches!(*w, "page" | "pages" | "route" | "screen" | "screens"));
    if is_page {
        ComponentType::Page
    } else {
        ComponentType::Component
    }
}

/// Component name for the emergency stub: plain word filtering, no patterns.
pub fn emergency_component_name(request: &str) -> String {
    let lower = request.to_lowercase();
    let picked: Vec<&str> = words(&lower)
        .into_iter()
        .filter(|w| {
            w.len() > 2
                && w.chars().all(|c| c.is_ascii_alphabetic())
                && !STOPWORDS.contains(w)
                && !ACTION_WORDS.contains(w)
                && !COLOR_WORDS.contains(w)
                && !CREATION_NOUNS.contains(w)
        })
        .take(2)
        .collect();
    let name = to_pascal_case(&picked.join(" "));
    if name.is_empty() {
        EMERGENCY_COMPONENT_NAME.to_string()
    } else {
        name
    }
}

/// `contact us` / `contact-us` / `contact_us` -> `ContactUs`
pub fn to_pascal_case(raw: &str) -> String {
    let name: String = raw
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    name.trim_start_matches(|c: char| c.is_ascii_digit()).to_string()
}
