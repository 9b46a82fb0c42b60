pub mod console;
pub mod html;
pub mod json;
pub mod markdown;
pub mod naming;

use serde::{Deserialize, Serialize};

/// Format of generated schema documentation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    /// `README.md` index plus one page per schema.
    #[default]
    Markdown,
    /// One self-contained `index.html`.
    Html,
    /// `schemas-documentation.json`.
    Json,
}

impl DocFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}
