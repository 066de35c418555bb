pub mod client;
pub mod parse;
pub mod prompts;

pub use client::{service_from_config, OpenRouterClient, ReasoningService, UnavailableService, WithDeadline};
pub use parse::{extract_code, normalize_generated_content, parse_structured_content};
