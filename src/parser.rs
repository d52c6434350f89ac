use crate::models::Priority;
use regex::Regex;
use std::sync::LazyLock;

static PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)!(low|medium|high)\b\s*").expect("priority pattern"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([\w-]+)\s*").expect("tag pattern"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("space pattern"));

#[derive(Debug, PartialEq)]
pub struct ParsedTask {
    pub title: String,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
}

/// Pulls `!priority` and `#tag` tokens out of a quick-add title.
pub fn parse_task_input(input: &str) -> ParsedTask {
    let mut priority = None;

    // Priority, first one wins
    for caps in PRIORITY_RE.captures_iter(input) {
        if let Some(priority_match) = caps.get(1) {
            if priority.is_none() {
                priority = priority_match.as_str().parse().ok();
            }
        }
    }

    let mut tags: Vec<String> = Vec::new();
    for caps in TAG_RE.captures_iter(input) {
        if let Some(tag_match) = caps.get(1) {
            let tag = tag_match.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    let title = PRIORITY_RE.replace_all(input, "");
    let title = TAG_RE.replace_all(&title, "");
    let title = SPACE_RE.replace_all(&title, " ").trim().to_string();

    ParsedTask {
        title,
        priority,
        tags,
    }
}

/// Splits a comma separated tag field, dropping blanks and duplicates.
pub fn parse_tag_list(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let tag = tag.trim_start_matches('#').to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
