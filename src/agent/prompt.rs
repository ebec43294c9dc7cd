//! Prompt templates.
//!
//! Five templates drive the system: the chat system prompt, the decision
//! template appended after action results, the forced final-answer
//! template, and the system prompts of the two batch agents. Each is
//! loaded from a markdown file when present, falling back to the
//! compiled-in default.
//!
//! Templates use `{name}` placeholders filled by [`fill_template`].

use std::path::{Path, PathBuf};

/// Chat system prompt.
pub const SYSTEM_PROMPT: &str = r"You are a data assistant for a database of companies and public funding incentives. You answer questions by querying a SQLite database.

## Schema

companies(id INTEGER PRIMARY KEY, company_name TEXT, cae_primary_label TEXT, trade_description_native TEXT, website TEXT, created_at TEXT, updated_at TEXT)

incentives(incentive_id INTEGER PRIMARY KEY, title TEXT, description TEXT, ai_description TEXT, document_urls TEXT, publication_date TEXT, start_date TEXT, end_date TEXT, total_budget REAL, source_link TEXT)

companies_fts is a full-text index over company_name, cae_primary_label and trade_description_native. Use `companies_fts MATCH 'term'` joined on `companies.id = companies_fts.rowid` for text search.

## Running queries

To run a query, put it in a fenced block tagged `sql`:

```sql
SELECT COUNT(*) FROM companies;
```

You may include several blocks in one reply; they run in order. You will then receive the results and can decide whether to query again or answer.

## Rules

- Only query what you need. Prefer `LIMIT` on exploratory queries.
- Dates are ISO-8601 text.
- When you have enough information, answer in plain language without any `sql` block.
- Never invent data that the queries did not return.";

/// Decision template appended after action results.
pub const DECISION_PROMPT: &str = r"The user originally asked: {original_user_message}

This was iteration {iteration_count} of at most {max_iterations}.

If the results above answer the question, reply with the final answer in plain language and no `sql` block. If a query failed or more data is needed, reply with corrected or follow-up queries in `sql` blocks.";

/// Template for the forced final call after the iteration cap.
pub const FINAL_ITERATION_PROMPT: &str = r"You have reached the limit of {max_iterations} query rounds for this question.

Using only the results already shown in this conversation, give the best final answer you can to: {original_user_message}

Do not include any `sql` block. If the data was insufficient, say what is missing.";

/// System prompt for keyword extraction.
pub const KEYWORDS_PROMPT: &str = r#"You extract search keywords from funding incentive descriptions. The keywords are used for full-text search over company names, activity labels (CAE) and trade descriptions, mostly written in Portuguese.

## Instructions

1. Identify the sectors, activities, products and company types the incentive targets.
2. Produce 5 to 15 short keywords or two-word phrases in the language of the company data (Portuguese).
3. Prefer concrete activity terms ("transporte", "logística", "panificação") over generic words ("empresa", "apoio").

## Output

Return ONLY a JSON array of strings, for example:
["logística", "transporte rodoviário", "armazenagem"]"#;

/// System prompt for candidate ranking.
pub const RANKING_PROMPT: &str = r"You match companies to funding incentives.

You receive one incentive and a list of candidate companies, each with an `id`. Rank the candidates by how well the incentive fits the company's activity.

## Output

Return ONLY a JSON array with the ids of the {top_k} most relevant companies, most relevant first, for example:
[12, 7, 31, 4, 19]

Use only ids from the candidate list.";

/// Default prompt directory under the user's home.
const DEFAULT_PROMPT_DIR: &str = ".config/querybot/prompts";

/// Filename for the chat system prompt.
const SYSTEM_FILENAME: &str = "system.md";
/// Filename for the decision template.
const DECISION_FILENAME: &str = "decision.md";
/// Filename for the final-iteration template.
const FINAL_ITERATION_FILENAME: &str = "final_iteration.md";
/// Filename for the keyword extraction prompt.
const KEYWORDS_FILENAME: &str = "keywords.md";
/// Filename for the ranking prompt.
const RANKING_FILENAME: &str = "ranking.md";

/// The full set of prompt templates.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Chat system prompt.
    pub system: String,
    /// Decision template (`{query_output}`, `{original_user_message}`,
    /// `{iteration_count}`, `{max_iterations}`).
    pub decision: String,
    /// Final-iteration template (`{max_iterations}`,
    /// `{original_user_message}`).
    pub final_iteration: String,
    /// Keyword extraction system prompt.
    pub keywords: String,
    /// Ranking system prompt (`{top_k}`).
    pub ranking: String,
}

impl PromptSet {
    /// Loads prompts, falling back per file to compiled-in defaults.
    ///
    /// Resolution order for the directory:
    /// 1. Explicit `prompt_dir` argument
    /// 2. `QUERYBOT_PROMPT_DIR` environment variable
    /// 3. `~/.config/querybot/prompts/`
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("QUERYBOT_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(path).ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            system: load_file(SYSTEM_FILENAME, SYSTEM_PROMPT),
            decision: load_file(DECISION_FILENAME, DECISION_PROMPT),
            final_iteration: load_file(FINAL_ITERATION_FILENAME, FINAL_ITERATION_PROMPT),
            keywords: load_file(KEYWORDS_FILENAME, KEYWORDS_PROMPT),
            ranking: load_file(RANKING_FILENAME, RANKING_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            decision: DECISION_PROMPT.to_string(),
            final_iteration: FINAL_ITERATION_PROMPT.to_string(),
            keywords: KEYWORDS_PROMPT.to_string(),
            ranking: RANKING_PROMPT.to_string(),
        }
    }

    /// Writes the default templates into `dir`, skipping files that
    /// already exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (SYSTEM_FILENAME, SYSTEM_PROMPT),
            (DECISION_FILENAME, DECISION_PROMPT),
            (FINAL_ITERATION_FILENAME, FINAL_ITERATION_PROMPT),
            (KEYWORDS_FILENAME, KEYWORDS_PROMPT),
            (RANKING_FILENAME, RANKING_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Replaces each `{name}` placeholder with its value.
///
/// Placeholders without a value are left as-is; values are inserted
/// verbatim and never re-scanned.
#[must_use]
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
