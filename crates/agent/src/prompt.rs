//! System prompt assembly.

use apex_core::analysis::CodebaseAnalysis;

use crate::context::GatheredFile;

const INSTRUCTIONS: &str = r#"You are the AI admin of this codebase. You change its source code by
returning a patch as a single JSON object, and nothing else.

Response format:
{
  "summary": "one-line description of the change",
  "description": "what changed and why",
  "files": [
    {
      "path": "relative/path/from/project/root.tsx",
      "action": "create" | "modify" | "delete",
      "content": "the COMPLETE new file content (omit for delete)",
      "explanation": "why this file changes"
    }
  ],
  "testingSteps": ["how a reviewer verifies the change"],
  "risks": ["what could break"],
  "databaseChanges": null
}

Rules:
1. "files" must contain at least one entry.
2. Paths are relative to the project root. Never use absolute paths or "..".
3. "modify" replaces the whole file: always return the full file, never a diff or an excerpt.
4. Never touch node_modules, build output, lock files or environment files.
5. Follow the conventions, frameworks and component library already used by the project.
6. Each path may appear only once.
7. Prefer the smallest change that fully satisfies the request."#;

/// Everything the prompt is assembled from.
pub struct PromptInput<'a> {
    pub request: &'a str,
    pub analysis: &'a CodebaseAnalysis,
    pub files: &'a [GatheredFile],
    pub component_inventory: &'a [String],
}

/// Render the system prompt. `previous_error` is the formatted validation
/// message of the last rejected attempt.
pub fn build_system_prompt(input: &PromptInput<'_>, previous_error: Option<&str>) -> String {
    let analysis = input.analysis;
    let mut out = String::with_capacity(
        INSTRUCTIONS.len() + input.files.iter().map(|f| f.size + 64).sum::<usize>() + 2048,
    );

    out.push_str(INSTRUCTIONS);
    out.push_str("\n\n## Project\n");
    if let Some(name) = &analysis.project_name {
        out.push_str(&format!("Name: {name}\n"));
    }
    out.push_str(&format!("Files: {}\n", analysis.total_files));
    push_list(&mut out, "Frameworks", &analysis.frameworks);
    push_list(&mut out, "Patterns", &analysis.patterns);

    out.push_str("\n## Directory structure\n```\n");
    out.push_str(&analysis.structure.render());
    out.push_str("```\n");

    if !input.component_inventory.is_empty() {
        out.push_str("\n## Existing components\n");
        out.push_str(&input.component_inventory.join(", "));
        out.push('\n');
    }

    out.push_str("\n## Relevant files\n");
    if input.files.is_empty() {
        out.push_str("(no files matched the request)\n");
    }
    for file in input.files {
        let lang = file.path.rsplit_once('.').map_or("", |(_, ext)| ext);
        out.push_str(&format!("\n### {}\n```{lang}\n{}\n```\n", file.path, file.content.trim_end()));
    }

    out.push_str("\n## Request\n");
    out.push_str(input.request.trim());
    out.push('\n');

    if let Some(error) = previous_error {
        out.push_str("\n## Your previous response was rejected\n");
        out.push_str(error.trim_end());
        out.push_str("\nReturn a corrected patch that fixes every error above.\n");
    }

    out
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        out.push_str(&format!("{label}: none detected\n"));
    } else {
        out.push_str(&format!("{label}: {}\n", items.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::analysis::analyze;

    fn analysis() -> CodebaseAnalysis {
        analyze("demo", &["src/app/page.tsx".to_string()], None)
    }

    #[test]
    fn prompt_embeds_files_request_and_inventory() {
        let files = vec![GatheredFile {
            path: "src/app/globals.css".into(),
            content: ":root {}".into(),
            size: 8,
            score: 5,
        }];
        let inventory = vec!["ThemeToggle".to_string()];
        let analysis = analysis();
        let prompt = build_system_prompt(
            &PromptInput {
                request: "add dark mode",
                analysis: &analysis,
                files: &files,
                component_inventory: &inventory,
            },
            None,
        );
        assert!(prompt.contains("### src/app/globals.css\n```css\n:root {}\n```"));
        assert!(prompt.contains("## Request\nadd dark mode"));
        assert!(prompt.contains("ThemeToggle"));
        assert!(prompt.contains("Patterns: App Router"));
        assert!(!prompt.contains("previous response"));
    }

    #[test]
    fn prompt_appends_previous_error() {
        let analysis = analysis();
        let prompt = build_system_prompt(
            &PromptInput {
                request: "r",
                analysis: &analysis,
                files: &[],
                component_inventory: &[],
            },
            Some("Patch validation failed.\n1. boom"),
        );
        assert!(prompt.contains("(no files matched the request)"));
        assert!(prompt.ends_with("Return a corrected patch that fixes every error above.\n"));
        assert!(prompt.contains("1. boom"));
    }
}
