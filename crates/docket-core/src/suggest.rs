use std::fmt::Debug;

use anyhow::Context;
use chrono::{DateTime, Days, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::{DayFrame, local_midnight};
use crate::task::DEFAULT_CATEGORY;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub subtasks: Vec<String>,
}

/// Proposes category, due date and subtasks for a draft task.
pub trait Suggester: Debug + Send + Sync {
    fn suggest(&self, input: &SuggestInput, frame: &DayFrame) -> Suggestion;
}

#[derive(Debug)]
struct CategoryRule {
    category: &'static str,
    pattern: Regex,
}

#[derive(Debug)]
struct SubtaskRule {
    pattern: Regex,
    steps: &'static [&'static str],
}

/// Keyword heuristics over the lowercased title and description.
#[derive(Debug)]
pub struct RuleBasedSuggester {
    // Later matches override earlier ones.
    categories: Vec<CategoryRule>,
    tomorrow: Regex,
    next_week: Regex,
    subtasks: Vec<SubtaskRule>,
}

impl RuleBasedSuggester {
    pub fn new() -> anyhow::Result<Self> {
        let rule = |category: &'static str, pattern: &str| -> anyhow::Result<CategoryRule> {
            Ok(CategoryRule {
                category,
                pattern: Regex::new(pattern)
                    .with_context(|| format!("invalid {category} pattern"))?,
            })
        };

        Ok(Self {
            categories: vec![
                rule(
                    "school",
                    r"exam|mid ?term|final|assignment|homework|課|考",
                )?,
                rule(
                    "work",
                    r"email|reply|meeting|report|presentation|cover letter|resume",
                )?,
                rule("personal", r"buy|購買|shopping|雜貨|grocer|milk|food")?,
            ],
            tomorrow: Regex::new(r"tomorrow|明天")?,
            next_week: Regex::new(r"next week|下週")?,
            subtasks: vec![
                SubtaskRule {
                    pattern: Regex::new(r"cover letter")?,
                    steps: &[
                        "Research the company",
                        "Draft the motivation paragraph",
                        "Proofread and export PDF",
                    ],
                },
                SubtaskRule {
                    pattern: Regex::new(r"presentation|簡報")?,
                    steps: &["Outline the talk", "Prepare slides", "Rehearse"],
                },
            ],
        })
    }
}

impl Suggester for RuleBasedSuggester {
    fn suggest(&self, input: &SuggestInput, frame: &DayFrame) -> Suggestion {
        let text = format!("{} {}", input.title, input.description).to_lowercase();

        let category = self
            .categories
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(&text))
            .map_or(DEFAULT_CATEGORY, |rule| rule.category);

        let offset = if self.tomorrow.is_match(&text) {
            Some(1)
        } else if self.next_week.is_match(&text) {
            Some(7)
        } else {
            None
        };
        let due_date = offset
            .and_then(|days| frame.today.checked_add_days(Days::new(days)))
            .map(|day| local_midnight(day, frame.tz));

        let subtasks = self
            .subtasks
            .iter()
            .find(|rule| rule.pattern.is_match(&text))
            .map(|rule| rule.steps.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        debug!(category, has_due = due_date.is_some(), "suggested");
        Suggestion {
            category: category.to_string(),
            due_date,
            subtasks,
        }
    }
}
