//! Extraction of files from role output.
//!
//! Roles emit files as fenced code blocks whose first line names the path:
//!
//! ````text
//! ```ts
//! // path: src/App.tsx
//! export default function App() {}
//! ```
//! ````
//!
//! Accepted hint forms are `path: X`, `file: X` and a bare commented path
//! such as `# Dockerfile`. Blocks without a usable hint are ignored.

use crate::quality::FileSet;
use crate::workflow::types::{Status, WorkflowRun};

const MAX_HINT_CHARS: usize = 200;

const COMMENT_OPENERS: &[&str] = &["<!--", "/*", "//", "--", "#", ";"];
const COMMENT_CLOSERS: &[&str] = &["-->", "*/"];
const BARE_FILENAMES: &[&str] = &["Dockerfile", "Makefile", "Procfile"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

/// Pull every path-hinted fenced block out of `text`, in order.
pub fn extract_file_blocks(text: &str) -> Vec<FileBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        if !line.trim_start().starts_with("```") {
            continue;
        }

        let mut body: Vec<&str> = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                closed = true;
                break;
            }
            body.push(inner);
        }
        if !closed {
            break;
        }

        let Some((hint_line, rest)) = body.split_first() else {
            continue;
        };
        let Some(path) = parse_path_hint(hint_line) else {
            continue;
        };
        if rest.iter().all(|l| l.trim().is_empty()) {
            continue;
        }

        let mut content = rest.join("\n");
        content.push('\n');
        blocks.push(FileBlock { path, content });
    }

    blocks
}

/// Interpret the first line of a fenced block as a path hint.
pub fn parse_path_hint(line: &str) -> Option<String> {
    let mut hint = line.trim();

    let mut commented = false;
    if let Some(opener) = COMMENT_OPENERS.iter().find(|o| hint.starts_with(*o)) {
        hint = hint[opener.len()..].trim();
        commented = true;
        for closer in COMMENT_CLOSERS {
            if let Some(stripped) = hint.strip_suffix(closer) {
                hint = stripped.trim();
            }
        }
    }

    let explicit = ["path:", "file:"]
        .iter()
        .find(|p| hint.get(..p.len()).is_some_and(|head| head.eq_ignore_ascii_case(p)));
    let candidate = match explicit {
        Some(prefix) => hint[prefix.len()..].trim(),
        None if commented => hint,
        None => return None,
    };
    let candidate = candidate.trim_matches('`');
    let candidate = candidate.strip_prefix("./").unwrap_or(candidate);

    if candidate.is_empty()
        || candidate.chars().count() > MAX_HINT_CHARS
        || candidate.chars().any(char::is_whitespace)
    {
        return None;
    }
    if !is_plausible_path(candidate) {
        return None;
    }
    // A bare comment must still look like a file, not prose.
    if explicit.is_none()
        && !candidate.contains('/')
        && !candidate.contains('.')
        && !BARE_FILENAMES.contains(&candidate)
    {
        return None;
    }

    Some(candidate.to_string())
}

/// Relative, no parent traversal, no scheme.
fn is_plausible_path(candidate: &str) -> bool {
    !candidate.starts_with('/')
        && !candidate.contains("://")
        && !candidate.split('/').any(|part| part == ".." || part.is_empty())
}

/// Assemble the file-set from every completed step. Later roles win.
pub fn build_file_set(run: &WorkflowRun) -> FileSet {
    let mut files = FileSet::new();
    for step in run.steps.iter().filter(|s| s.status == Status::Completed) {
        if let Some(output) = &step.output {
            for block in extract_file_blocks(output) {
                files.insert(block.path, block.content);
            }
        }
    }
    files
}

/// Whether any completed step carries at least one file block.
pub fn has_file_blocks(run: &WorkflowRun) -> bool {
    run.steps
        .iter()
        .filter(|s| s.status == Status::Completed)
        .filter_map(|s| s.output.as_deref())
        .any(|o| !extract_file_blocks(o).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::roles::Role;
    use crate::workflow::types::AgentStep;

    #[test]
    fn test_hint_forms() {
        assert_eq!(parse_path_hint("path: src/App.tsx").as_deref(), Some("src/App.tsx"));
        assert_eq!(parse_path_hint("File: backend/api.js").as_deref(), Some("backend/api.js"));
        assert_eq!(parse_path_hint("// path: src/a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(parse_path_hint("// src/a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(parse_path_hint("# Dockerfile").as_deref(), Some("Dockerfile"));
        assert_eq!(parse_path_hint("<!-- docs/README.md -->").as_deref(), Some("docs/README.md"));
        assert_eq!(parse_path_hint("-- db/schema.sql").as_deref(), Some("db/schema.sql"));
        assert_eq!(parse_path_hint("path: ./tests/a.test.ts").as_deref(), Some("tests/a.test.ts"));
    }

    #[test]
    fn test_hint_rejections() {
        // Code, not a hint.
        assert!(parse_path_hint("import React from 'react';").is_none());
        assert!(parse_path_hint("src/App.tsx").is_none());
        // Prose in a comment.
        assert!(parse_path_hint("// set up the server").is_none());
        assert!(parse_path_hint("# Install").is_none());
        // Whitespace inside the hint.
        assert!(parse_path_hint("path: src/my file.ts").is_none());
        // Too long.
        let long = format!("path: src/{}.ts", "a".repeat(200));
        assert!(parse_path_hint(&long).is_none());
        // Escapes.
        assert!(parse_path_hint("path: ../etc/passwd").is_none());
        assert!(parse_path_hint("path: /etc/passwd").is_none());
        assert!(parse_path_hint("path:").is_none());
    }

    #[test]
    fn test_extract_blocks() {
        let text = "Here you go.\n\n```ts\n// path: src/App.tsx\nexport const App = 1;\n```\n\n```\nno hint here\n```\n\n```yaml\n# .github/workflows/ci.yml\non: push\n```\n";
        let blocks = extract_file_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "src/App.tsx");
        assert_eq!(blocks[0].content, "export const App = 1;\n");
        assert_eq!(blocks[1].path, ".github/workflows/ci.yml");
    }

    #[test]
    fn test_empty_body_discarded() {
        let text = "```\npath: src/a.ts\n\n   \n```\n";
        assert!(extract_file_blocks(text).is_empty());
    }

    #[test]
    fn test_unterminated_block_ignored() {
        let text = "```\npath: src/a.ts\nconst a = 1;\n";
        assert!(extract_file_blocks(text).is_empty());
    }

    #[test]
    fn test_build_file_set_later_roles_win() {
        let mut run = WorkflowRun::new("x");
        let mut a = AgentStep::start(Role::Backend, String::new());
        a.complete("```\npath: backend/app.js\nv1\n```\n".to_string());
        let mut b = AgentStep::start(Role::Security, String::new());
        b.complete("```\npath: backend/app.js\nv2\n```\n```\npath: backend/auth.js\nauth\n```".to_string());
        let mut c = AgentStep::start(Role::Qa, String::new());
        c.fail("boom".to_string());
        run.steps = vec![a, b, c];

        let files = build_file_set(&run);
        assert_eq!(files.len(), 2);
        assert_eq!(files["backend/app.js"], "v2\n");
        assert!(has_file_blocks(&run));
    }
}
