//! Keyword extraction, candidate discovery and path scoring for context
//! gathering.
//!
//! The gatherer in the agent crate lists the project tree and loads file
//! contents; everything here works on plain path strings so the heuristics
//! can be tested without a filesystem.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of files kept after ranking.
pub const DEFAULT_MAX_FILES: usize = 15;

/// Default per-file byte budget when loading contents.
pub const DEFAULT_MAX_FILE_SIZE: usize = 50_000;

/// Generic words shorter than or equal to this are dropped.
const MIN_WORD_LEN: usize = 3;

/// Words that never carry intent.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "please", "make", "should",
    "would", "could", "when", "then", "than", "them", "they", "have", "need", "want", "also",
    "some", "there", "their", "what", "which", "where", "while", "will", "just", "like", "page",
    "file", "files", "code", "change", "update", "create", "modify", "delete", "remove", "about",
];

/// Directories scanned when a generic keyword appears in a path.
pub const COMMON_DIRS: &[&str] = &[
    "src/app",
    "src/components",
    "src/lib",
    "src/server",
    "src/hooks",
    "src/utils",
    "src/styles",
    "app",
    "components",
    "lib",
    "pages",
    "styles",
];

/// Directories whose contents should almost never be handed to the model.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", "vendor", "dist", ".next", "build", ".git"];

/// Extensions treated as source when scanning.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "json", "css", "scss", "md", "mdx", "sql", "prisma",
];

static FILE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_\-./\[\]()]+\.(?:tsx|ts|jsx|js|mjs|cjs|json|css|scss|mdx|md|sql|prisma|ya?ml)\b")
        .expect("valid regex")
});

static PASCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b").expect("valid regex"));

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|'([^']+)'|`([^`]+)`"#).expect("valid regex"));

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9_-]*").expect("valid regex"));

// ---------------------------------------------------------------------------
// Keyword table
// ---------------------------------------------------------------------------

/// One domain bucket: the words that trigger it and where its files live.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub bucket: &'static str,
    /// Lower-case whole words that select this bucket. A trailing `s` or
    /// `es` on the request word is ignored.
    pub triggers: &'static [&'static str],
    /// Substrings matched against the lower-cased file name.
    pub file_patterns: &'static [&'static str],
    /// Path prefixes whose files belong to this bucket.
    pub directories: &'static [&'static str],
    /// Extensions that belong to this bucket wherever they live.
    pub extensions: &'static [&'static str],
}

impl KeywordRule {
    pub fn is_triggered_by(&self, word: &str) -> bool {
        let singular = [
            Some(word),
            word.strip_suffix('s'),
            word.strip_suffix("es"),
        ];
        self.triggers
            .iter()
            .any(|t| singular.iter().flatten().any(|w| w == t))
    }

    /// Whether `path` falls into this bucket.
    pub fn matches(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);

        self.file_patterns.iter().any(|p| file_name.contains(p))
            || self
                .directories
                .iter()
                .any(|d| lower.starts_with(&format!("{d}/")))
            || extension_of(&lower).is_some_and(|ext| self.extensions.contains(&ext))
    }
}

pub const KEYWORD_TABLE: &[KeywordRule] = &[
    KeywordRule {
        bucket: "theme",
        triggers: &["theme", "dark", "light", "color", "colour", "style", "css", "tailwind", "palette"],
        file_patterns: &["theme", "tailwind.config", "globals.css", "layout.tsx", "providers"],
        directories: &["src/styles", "styles", "src/components/theme"],
        extensions: &["css", "scss"],
    },
    KeywordRule {
        bucket: "auth",
        triggers: &["auth", "login", "logout", "signin", "signup", "session", "password", "oauth"],
        file_patterns: &["auth", "session", "middleware", "login", "signin"],
        directories: &["src/app/(auth)", "src/lib/auth", "src/server/auth"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "database",
        triggers: &["database", "schema", "table", "migration", "prisma", "drizzle", "postgres", "query"],
        file_patterns: &["schema", "db.ts", "drizzle", "migration"],
        directories: &["src/server/db", "src/db", "prisma", "drizzle", "migrations"],
        extensions: &["sql", "prisma"],
    },
    KeywordRule {
        bucket: "billing",
        triggers: &["billing", "stripe", "payment", "subscription", "invoice", "plan", "pricing", "checkout"],
        file_patterns: &["billing", "stripe", "subscription", "pricing", "checkout"],
        directories: &["src/app/billing", "src/lib/stripe", "src/app/(dashboard)/billing"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "api",
        triggers: &["api", "endpoint", "router", "trpc", "route", "webhook"],
        file_patterns: &["router", "trpc", "route.ts", "root.ts"],
        directories: &["src/server/api", "src/app/api", "pages/api"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "agent",
        triggers: &["agent", "assistant", "chatbot", "prompt", "llm", "openai"],
        file_patterns: &["agent", "assistant", "prompt", "openai"],
        directories: &["src/app/agents", "src/components/agents", "src/lib/ai"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "ui",
        triggers: &["button", "modal", "dialog", "form", "input", "component", "card", "sidebar", "navbar", "header", "footer", "layout"],
        file_patterns: &["button", "modal", "dialog", "form", "card", "sidebar", "navbar", "header", "footer", "layout"],
        directories: &["src/components/ui", "components/ui"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "dashboard",
        triggers: &["dashboard", "overview", "stats", "analytics", "chart", "metric"],
        file_patterns: &["dashboard", "overview", "stats", "analytics", "chart"],
        directories: &["src/app/dashboard", "src/app/(dashboard)", "src/components/dashboard"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "team",
        triggers: &["team", "member", "invite", "organization", "organisation", "workspace", "role"],
        file_patterns: &["team", "member", "invite", "organization", "workspace"],
        directories: &["src/app/team", "src/components/team"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "knowledge",
        triggers: &["knowledge", "document", "upload", "embedding", "vector", "search"],
        file_patterns: &["knowledge", "document", "upload", "embedding", "search"],
        directories: &["src/app/knowledge", "src/components/knowledge"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "config",
        triggers: &["config", "setting", "environment", "env", "tsconfig"],
        file_patterns: &["config", "settings", "env"],
        directories: &["src/config", "config"],
        extensions: &[],
    },
    KeywordRule {
        bucket: "test",
        triggers: &["test", "spec", "jest", "vitest", "playwright", "coverage"],
        file_patterns: &[".test.", ".spec.", "jest.config", "vitest.config", "playwright.config"],
        directories: &["tests", "__tests__", "e2e"],
        extensions: &[],
    },
];

// ---------------------------------------------------------------------------
// Keyword extraction
// ---------------------------------------------------------------------------

/// Keywords pulled out of a free-text request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keywords {
    /// Explicit file-like tokens, e.g. `src/app/layout.tsx`.
    pub file_mentions: Vec<String>,
    /// PascalCase tokens, lower-cased (candidate component names).
    pub components: Vec<String>,
    /// Quoted substrings, lower-cased.
    pub quoted: Vec<String>,
    /// Generic words longer than three characters, stop-words removed.
    pub words: Vec<String>,
    /// Every word of the request, lower-cased and split at camelCase
    /// boundaries, with no length filter. Only the keyword table reads it.
    #[serde(skip)]
    pub tokens: Vec<String>,
}

impl Keywords {
    /// Every keyword, deduplicated, in extraction order.
    pub fn all(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.file_mentions
            .iter()
            .chain(&self.components)
            .chain(&self.quoted)
            .chain(&self.words)
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.file_mentions.is_empty()
            && self.components.is_empty()
            && self.quoted.is_empty()
            && self.words.is_empty()
    }

    /// Buckets of [`KEYWORD_TABLE`] whose triggers appear as whole words.
    pub fn matched_rules(&self) -> Vec<&'static KeywordRule> {
        KEYWORD_TABLE
            .iter()
            .filter(|rule| self.tokens.iter().any(|t| rule.is_triggered_by(t)))
            .collect()
    }
}

/// Extract keywords from a request.
pub fn extract_keywords(prompt: &str) -> Keywords {
    let mut keywords = Keywords::default();

    for m in FILE_TOKEN_RE.find_iter(prompt) {
        push_unique(&mut keywords.file_mentions, m.as_str().trim_start_matches("./").to_string());
    }

    for m in PASCAL_RE.find_iter(prompt) {
        push_unique(&mut keywords.components, m.as_str().to_ascii_lowercase());
    }

    for caps in QUOTED_RE.captures_iter(prompt) {
        if let Some(q) = caps.iter().skip(1).flatten().next() {
            let q = q.as_str().trim().to_ascii_lowercase();
            if !q.is_empty() {
                push_unique(&mut keywords.quoted, q);
            }
        }
    }

    let lower = prompt.to_ascii_lowercase();
    for m in WORD_RE.find_iter(&lower) {
        let word = m.as_str().trim_matches(|c| c == '-' || c == '_');
        if word.len() > MIN_WORD_LEN && !STOP_WORDS.contains(&word) {
            push_unique(&mut keywords.words, word.to_string());
        }
    }

    for token in word_tokens(prompt) {
        push_unique(&mut keywords.tokens, token);
    }

    keywords
}

/// Split on anything that is not an ASCII letter or digit, then at each
/// lower-to-upper case change, so `ThemeToggle` yields `theme` and `toggle`
/// and `API` stays whole.
fn word_tokens(prompt: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in prompt.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in chunk.chars() {
            if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            current.push(c.to_ascii_lowercase());
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// How the candidate set was found, strongest signal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    /// The request named files directly.
    DirectMention,
    /// One or more keyword buckets matched.
    KeywordTable,
    /// Only the common-directory scan produced candidates.
    DirectoryScan,
    /// Nothing matched.
    None,
}

impl ContextStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMention => "direct_mention",
            Self::KeywordTable => "keyword_table",
            Self::DirectoryScan => "directory_scan",
            Self::None => "none",
        }
    }
}

/// Candidate paths selected from a project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub paths: BTreeSet<String>,
    pub buckets: Vec<&'static str>,
    pub strategy: ContextStrategy,
}

/// Union of the three discovery heuristics over `all_paths`.
pub fn discover<S: AsRef<str>>(all_paths: &[S], keywords: &Keywords) -> Discovery {
    let mut paths = BTreeSet::new();

    let mut direct = false;
    for mention in &keywords.file_mentions {
        let mention = mention.to_ascii_lowercase();
        for path in all_paths.iter().map(AsRef::as_ref) {
            let lower = path.to_ascii_lowercase();
            if lower == mention || lower.ends_with(&format!("/{mention}")) {
                paths.insert(path.to_string());
                direct = true;
            }
        }
    }

    let rules = keywords.matched_rules();
    let mut by_table = false;
    for rule in &rules {
        for path in all_paths.iter().map(AsRef::as_ref) {
            if !is_excluded(path) && rule.matches(path) {
                by_table |= paths.insert(path.to_string());
            }
        }
    }

    let terms: Vec<String> = keywords
        .components
        .iter()
        .chain(&keywords.quoted)
        .chain(&keywords.words)
        .cloned()
        .collect();
    let mut by_scan = false;
    for path in all_paths.iter().map(AsRef::as_ref) {
        if is_excluded(path) || !is_source_file(path) || !in_common_dir(path) {
            continue;
        }
        let lower = path.to_ascii_lowercase();
        let compact = lower.replace(['-', '_'], "");
        if terms
            .iter()
            .any(|t| lower.contains(t.as_str()) || compact.contains(&t.replace(['-', '_', ' '], "")))
        {
            by_scan |= paths.insert(path.to_string());
        }
    }

    let strategy = if direct {
        ContextStrategy::DirectMention
    } else if by_table || (!rules.is_empty() && !paths.is_empty()) {
        ContextStrategy::KeywordTable
    } else if by_scan {
        ContextStrategy::DirectoryScan
    } else {
        ContextStrategy::None
    };

    Discovery {
        paths,
        buckets: rules.iter().map(|r| r.bucket).collect(),
        strategy,
    }
}

fn in_common_dir(path: &str) -> bool {
    COMMON_DIRS
        .iter()
        .any(|d| path.starts_with(&format!("{d}/")))
}

/// Whether the path sits under a vendored or generated directory.
pub fn is_excluded(path: &str) -> bool {
    path.split('/').any(|seg| EXCLUDED_DIRS.contains(&seg))
}

pub fn is_source_file(path: &str) -> bool {
    extension_of(&path.to_ascii_lowercase()).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn extension_of(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next()?;
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

const TYPESCRIPT_BONUS: i32 = 10;
const SOURCE_DIR_BONUS: i32 = 5;
const DEPTH_PENALTY: i32 = 2;
const TEST_OR_VENDOR_PENALTY: i32 = 50;
const COMPONENT_OR_API_BONUS: i32 = 8;
const KEYWORD_HIT_BONUS: i32 = 6;

/// Additive relevance score for one candidate path.
pub fn score_path(path: &str, keywords: &Keywords) -> i32 {
    let lower = path.to_ascii_lowercase();
    let mut score = 0;

    if lower.ends_with(".ts") || lower.ends_with(".tsx") {
        score += TYPESCRIPT_BONUS;
    }
    if lower.starts_with("src/") {
        score += SOURCE_DIR_BONUS;
    }

    let depth = lower.matches('/').count() as i32;
    score -= depth * DEPTH_PENALTY;

    if is_excluded(&lower) || is_test_path(&lower) {
        score -= TEST_OR_VENDOR_PENALTY;
    }

    if lower.contains("/components/")
        || lower.starts_with("components/")
        || lower.contains("/api/")
        || lower.contains("/server/api/")
    {
        score += COMPONENT_OR_API_BONUS;
    }

    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let hits = keywords
        .all()
        .iter()
        .filter(|k| file_name.contains(k.as_str()))
        .count() as i32;
    score += hits * KEYWORD_HIT_BONUS;

    score
}

fn is_test_path(lower: &str) -> bool {
    lower.contains(".test.")
        || lower.contains(".spec.")
        || lower.split('/').any(|seg| seg == "__tests__" || seg == "tests" || seg == "e2e")
}

/// A candidate with its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPath {
    pub path: String,
    pub score: i32,
}

/// Score every candidate and keep the best `max_files`.
///
/// Ties break on path so the order is deterministic.
pub fn rank<'a>(
    candidates: impl IntoIterator<Item = &'a String>,
    keywords: &Keywords,
    max_files: usize,
) -> Vec<RankedPath> {
    let mut ranked: Vec<RankedPath> = candidates
        .into_iter()
        .map(|path| RankedPath {
            score: score_path(path, keywords),
            path: path.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    ranked.truncate(max_files);
    ranked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
