//! Structural patch validation (pure, no I/O).
//!
//! [`decode_patch`] is the boundary between raw model output and the typed
//! [`PatchData`]; [`validate`] then checks the invariants a patch must hold
//! before it may be applied. Both report through [`ValidationResult`] so the
//! generator can feed either failure back into its next prompt.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::patch::{FileChange, PatchData, ACTION_CREATE, ACTION_DELETE, ACTION_MODIFY};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum size of a single file's content (bytes).
pub const MAX_FILE_SIZE_BYTES: usize = 500_000;

/// File count above which a patch is considered hard to review.
pub const MAX_RECOMMENDED_FILES: usize = 20;

/// Content size above which a file is considered oversized for review.
pub const LARGE_FILE_BYTES: usize = 100_000;

/// Message used when the model returned no file changes.
pub const EMPTY_FILES_ERROR: &str =
    "Patch contains an empty files array: at least one file change is required";

/// Literal returned by [`format_error_message`] for a passing result.
pub const VALIDATION_PASSED_MESSAGE: &str = "Patch validation passed";

/// Extensions a patch may write. Checked only when the file name has a dot.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json", ".css", ".scss", ".md", ".mdx",
    ".html", ".sql", ".prisma", ".yml", ".yaml", ".toml", ".txt", ".svg", ".sh", ".env",
    ".example", ".gitignore", ".d.ts",
];

/// Directory names holding third-party code that a patch should not touch.
pub const VENDORED_DIRS: &[&str] = &["node_modules", "vendor", ".next", "dist"];

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// Outcome of validating one patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// A failed result carrying a single error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::from_findings(vec![error.into()], Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Boundary decoding
// ---------------------------------------------------------------------------

/// Decode raw model output into a typed patch.
///
/// Tolerates a surrounding Markdown code fence. Entries with a missing path
/// or unknown action cannot be represented and are reported as errors here;
/// a create/modify without `content` decodes with empty content so that
/// [`validate`] reports it against the file's path.
pub fn decode_patch(raw: &str) -> Result<PatchData, ValidationResult> {
    let text = strip_code_fence(raw);
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ValidationResult::failure(format!("Response is not valid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ValidationResult::failure("Patch must be a JSON object"))?;

    let files = match obj.get("files") {
        Some(Value::Array(files)) => files,
        Some(_) => return Err(ValidationResult::failure("Patch 'files' must be an array")),
        None => return Err(ValidationResult::failure("Patch is missing the 'files' array")),
    };

    let mut errors = Vec::new();
    let mut changes = Vec::with_capacity(files.len());
    for (idx, entry) in files.iter().enumerate() {
        match decode_file_change(idx + 1, entry) {
            Ok(change) => changes.push(change),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(ValidationResult::from_findings(errors, Vec::new()));
    }

    Ok(PatchData {
        files: changes,
        summary: string_field(obj, "summary"),
        description: string_field(obj, "description"),
        testing_steps: string_list(obj, "testingSteps"),
        risks: string_list(obj, "risks"),
        database_changes: obj.get("databaseChanges").filter(|v| !v.is_null()).cloned(),
    })
}

fn decode_file_change(position: usize, entry: &Value) -> Result<FileChange, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| format!("File #{position} must be an object"))?;

    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("File #{position} is missing a path"))?
        .to_string();

    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let explanation = string_field(obj, "explanation");

    match action {
        ACTION_CREATE => Ok(FileChange::Create {
            path,
            content,
            explanation,
        }),
        ACTION_MODIFY => Ok(FileChange::Modify {
            path,
            content,
            explanation,
        }),
        ACTION_DELETE => Ok(FileChange::Delete { path, explanation }),
        other => Err(format!(
            "File '{path}' has invalid action '{other}'. Must be one of: create, modify, delete"
        )),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a decoded patch.
///
/// `request` is the original request text; when present, a patch whose
/// summary is missing gets a warning quoting the request so the operator can
/// judge intent.
pub fn validate(patch: &PatchData, request: Option<&str>) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if patch.files.is_empty() {
        errors.push(EMPTY_FILES_ERROR.to_string());
    }

    for change in &patch.files {
        check_file(change, &mut errors, &mut warnings);
    }

    check_duplicates(&patch.files, &mut errors);
    check_create_under_delete(&patch.files, &mut warnings);

    if patch.summary.is_none() {
        match request {
            Some(req) if !req.trim().is_empty() => warnings.push(format!(
                "Patch is missing a summary (request was: \"{}\")",
                req.trim()
            )),
            _ => warnings.push("Patch is missing a summary".to_string()),
        }
    }
    if patch.testing_steps.is_empty() {
        warnings.push("Patch is missing testingSteps".to_string());
    }

    ValidationResult::from_findings(errors, warnings)
}

fn check_file(change: &FileChange, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    let path = change.path();

    if path.trim().is_empty() {
        errors.push("A file entry has an empty path".to_string());
        return;
    }

    if let Some(content) = change.content() {
        if content.trim().is_empty() {
            errors.push(format!(
                "File '{path}': action '{}' requires non-empty content",
                change.action()
            ));
        }
        if content.len() > MAX_FILE_SIZE_BYTES {
            errors.push(format!(
                "File '{path}' is too large ({} bytes, maximum {MAX_FILE_SIZE_BYTES})",
                content.len()
            ));
        }
    }

    let absolute = is_absolute(path);
    if absolute {
        errors.push(format!("File '{path}' must use a relative path"));
    }
    if path.contains('\0') {
        errors.push(format!("File '{}' contains a null byte", path.replace('\0', "\\0")));
    }
    if !has_recognized_extension(path) {
        errors.push(format!("File '{path}' has an unrecognized file extension"));
    }

    if path.split(['/', '\\']).any(|seg| seg == "..") {
        warnings.push(format!("File '{path}' uses '..' (path traversal risk)"));
    }
    if path
        .split(['/', '\\'])
        .any(|seg| VENDORED_DIRS.contains(&seg))
    {
        warnings.push(format!("File '{path}' is inside a vendored dependency directory"));
    }
    if absolute {
        warnings.push(format!("File '{path}' is an absolute path"));
    }
}

fn check_duplicates(files: &[FileChange], errors: &mut Vec<String>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for change in files {
        let count = counts.entry(change.path()).or_insert(0);
        if *count == 0 {
            order.push(change.path());
        }
        *count += 1;
    }
    for path in order {
        let count = counts[path];
        if count > 1 {
            errors.push(format!("Duplicate path '{path}' appears {count} times"));
        }
    }
}

fn check_create_under_delete(files: &[FileChange], warnings: &mut Vec<String>) {
    let deleted: HashSet<&str> = files
        .iter()
        .filter(|c| matches!(c, FileChange::Delete { .. }))
        .map(|c| c.path().trim_end_matches('/'))
        .collect();

    for change in files {
        let FileChange::Create { path, .. } = change else {
            continue;
        };
        if let Some(dir) = deleted
            .iter()
            .find(|d| path.strip_prefix(**d).is_some_and(|rest| rest.starts_with('/')))
        {
            warnings.push(format!(
                "File '{path}' is created inside '{dir}', which this patch deletes"
            ));
        }
    }
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

fn has_recognized_extension(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    if !file_name.contains('.') {
        return true;
    }
    let lower = file_name.to_ascii_lowercase();
    RECOGNIZED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Render a validation result for logs and for the retry prompt.
pub fn format_error_message(result: &ValidationResult) -> String {
    if result.valid {
        return VALIDATION_PASSED_MESSAGE.to_string();
    }

    let mut out = String::from("Patch validation failed.\n\nErrors:\n");
    for (i, err) in result.errors.iter().enumerate() {
        out.push_str(&format!("{}. {err}\n", i + 1));
    }
    if !result.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for (i, warning) in result.warnings.iter().enumerate() {
            out.push_str(&format!("{}. {warning}\n", i + 1));
        }
    }
    if result.errors.iter().any(|e| e == EMPTY_FILES_ERROR) {
        out.push_str(
            "\nTip: the 'files' array must contain at least one entry with a path, an action \
             (create, modify or delete) and the complete file content. If the request needs no \
             code change, explain why in 'summary' and still propose the smallest concrete edit.\n",
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Quality assessment
// ---------------------------------------------------------------------------

/// Advisory quality score for a patch. Never blocks application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityAssessment {
    /// 0 (poor) to 100 (complete).
    pub score: u8,
    pub issues: Vec<String>,
}

/// Score a patch from 100 down, penalising missing metadata, very large
/// patches, oversized files and missing per-file explanations.
pub fn assess_patch_quality(patch: &PatchData) -> QualityAssessment {
    let mut score: i32 = 100;
    let mut issues = Vec::new();

    if patch.summary.is_none() {
        score -= 15;
        issues.push("Missing summary".to_string());
    }
    if patch.testing_steps.is_empty() {
        score -= 15;
        issues.push("Missing testing steps".to_string());
    }
    if patch.risks.is_empty() {
        score -= 5;
        issues.push("No risks listed".to_string());
    }
    if patch.files.len() > MAX_RECOMMENDED_FILES {
        score -= 20;
        issues.push(format!(
            "Patch touches {} files (more than {MAX_RECOMMENDED_FILES})",
            patch.files.len()
        ));
    }

    let oversized = patch
        .files
        .iter()
        .filter(|f| f.content().is_some_and(|c| c.len() > LARGE_FILE_BYTES))
        .count();
    if oversized > 0 {
        score -= (10 * oversized as i32).min(30);
        issues.push(format!("{oversized} file(s) exceed {LARGE_FILE_BYTES} bytes"));
    }

    let unexplained = patch
        .files
        .iter()
        .filter(|f| f.explanation().is_none_or(|e| e.trim().is_empty()))
        .count();
    if unexplained > 0 {
        score -= (5 * unexplained as i32).min(25);
        issues.push(format!("{unexplained} file(s) lack an explanation"));
    }

    QualityAssessment {
        score: score.clamp(0, 100) as u8,
        issues,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
