use async_trait::async_trait;

use crate::error::Result;
use crate::quality::{FileSet, LintReport, TestReport, ValidationIssue, Validator};

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "java", "kt", "go", "c", "h", "cpp", "cs", "swift",
    "py", "css", "scss",
];

/// Dependency-free validator used when no external lint service is wired in.
///
/// Formatting is limited to whitespace normalisation. Syntax checking is
/// bracket balance for code files and a parse for JSON.
#[derive(Debug, Default, Clone)]
pub struct HeuristicValidator;

impl HeuristicValidator {
    pub fn new() -> Self {
        Self
    }
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

fn is_code_file(path: &str) -> bool {
    extension(path).is_some_and(|ext| CODE_EXTENSIONS.contains(&ext))
}

fn is_test_file(path: &str) -> bool {
    path.starts_with("tests/")
        || path.contains("/tests/")
        || path.contains(".test.")
        || path.contains(".spec.")
        || path.contains("_test.")
}

/// Strip trailing whitespace from each line and end with exactly one newline.
fn normalize_whitespace(content: &str) -> String {
    let mut out: String = content
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed_len = out.trim_end_matches('\n').len();
    out.truncate(trimmed_len);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

const COMMENT_OPENERS: &[&str] = &["//", "/*", "<!--", "--", "#"];

/// The part of `line` after its first comment opener, if any.
fn comment_text(line: &str) -> Option<&str> {
    COMMENT_OPENERS
        .iter()
        .filter_map(|opener| line.find(opener).map(|at| at + opener.len()))
        .min()
        .map(|start| &line[start..])
        .or_else(|| {
            // Continuation lines of a block comment.
            let trimmed = line.trim_start();
            trimmed.strip_prefix('*')
        })
}

fn contains_word(text: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(word).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// `TODO`/`FIXME` left in comments. Identifiers and strings do not count.
fn marker_issues(path: &str, content: &str) -> Vec<ValidationIssue> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let comment = comment_text(line)?;
            ["TODO", "FIXME"]
                .iter()
                .find(|m| contains_word(comment, m))
                .map(|m| {
                    ValidationIssue::error(
                        "comments",
                        path,
                        format!("Unresolved {m} marker at line {}", i + 1),
                    )
                })
        })
        .collect()
}

/// Check `()[]{}` nesting, skipping string literals and line comments.
fn bracket_issue(path: &str, content: &str) -> Option<ValidationIssue> {
    let ext = extension(path).unwrap_or_default();
    let hash_comments = ext == "py";
    // Rust lifetimes and apostrophes in JSX text make `'` unreliable as a quote.
    let single_quotes = !matches!(ext, "rs" | "tsx" | "jsx");

    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut quote: Option<char> = None;

    for (line_no, line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '`' => quote = Some(c),
                '\'' if single_quotes => quote = Some(c),
                '/' if chars.peek() == Some(&'/') => break,
                '#' if hash_comments => break,
                '(' | '[' | '{' => stack.push((c, line_no)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => {
                            return Some(ValidationIssue::error(
                                "syntax",
                                path,
                                format!("Unbalanced `{c}` at line {line_no}"),
                            ))
                        }
                    }
                }
                _ => {}
            }
        }
        // Only template literals may span lines.
        if quote.is_some_and(|q| q != '`') {
            quote = None;
        }
    }

    stack.pop().map(|(open, line_no)| {
        ValidationIssue::error(
            "syntax",
            path,
            format!("Unclosed `{open}` opened at line {line_no}"),
        )
    })
}

#[async_trait]
impl Validator for HeuristicValidator {
    async fn lint_and_format(&self, files: &FileSet) -> Result<LintReport> {
        let mut report = LintReport::default();

        for (path, content) in files {
            if content.trim().is_empty() {
                report
                    .issues
                    .push(ValidationIssue::warning("lint", path, "File is empty"));
            }
            report.issues.extend(marker_issues(path, content));

            let formatted = normalize_whitespace(content);
            if formatted != *content {
                report.formatted_files += 1;
            }
            report.files.insert(path.clone(), formatted);
        }

        Ok(report)
    }

    async fn validate_tests_and_syntax(&self, files: &FileSet) -> Result<TestReport> {
        let mut report = TestReport::default();
        let mut sources = 0u32;
        let mut tests = 0u32;

        for (path, content) in files {
            if extension(path) == Some("json") {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(content) {
                    report
                        .issues
                        .push(ValidationIssue::error("syntax", path, format!("Invalid JSON: {e}")));
                }
                continue;
            }
            if !is_code_file(path) {
                continue;
            }
            if let Some(issue) = bracket_issue(path, content) {
                report.issues.push(issue);
            }
            if is_test_file(path) {
                tests += 1;
            } else {
                sources += 1;
            }
        }

        report.coverage_estimate = match (sources, tests) {
            (0, 0) => 0,
            (0, _) => 100,
            (s, t) => (t * 100 / s).min(100),
        };
        Ok(report)
    }
}
