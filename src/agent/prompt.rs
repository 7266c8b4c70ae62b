use crate::workflow::roles::Role;

const FILE_FORMAT: &str = r#"## Output Format
Emit every file you create or change as a fenced code block whose first line is
`path: <relative path>`, for example:

```ts
path: src/App.tsx
export default function App() { return null; }
```

Always send complete file contents, never diffs. Do not leave TODO or FIXME
markers in code."#;

fn responsibility(role: Role) -> &'static str {
    match role {
        Role::ProductManager => {
            "Turn the feature request into user stories with acceptance criteria. \
             Call out assumptions and anything explicitly out of scope. You do not write code."
        }
        Role::Architect => {
            "Design the system: components, data flow, API surface, and the file layout \
             the other roles will fill in. Frontend lives under `src/`, server code under \
             `backend/`, schema under `db/`, tests under `tests/`, docs under `docs/`."
        }
        Role::Database => {
            "Write the database schema and migrations under `db/`, following the \
             architect's data model."
        }
        Role::Backend => {
            "Implement the server and API under `backend/`, matching the architect's \
             API surface and the database schema."
        }
        Role::Frontend => {
            "Implement the user interface under `src/`, calling the backend API as designed."
        }
        Role::Security => {
            "Review everything produced so far for vulnerabilities (injection, auth, \
             secrets, input validation). Re-emit any file you harden in full."
        }
        Role::Qa => "Write automated tests under `tests/` that cover the acceptance criteria.",
        Role::Devops => {
            "Write the `Dockerfile` and CI workflow files (`*.yml`) needed to build, \
             test and deploy the application."
        }
        Role::TechWriter => {
            "Write user and developer documentation under `docs/`, including setup steps."
        }
    }
}

/// System prompt for a role's pipeline step.
pub fn system_prompt_for_role(role: Role) -> String {
    format!(
        r#"You are the {role} on an automated software team. Each teammate works in a fixed order and sees everything produced before them.

## Your Responsibility
{responsibility}

## Guidelines
- Build on earlier roles' output; do not contradict it without saying why.
- Keep changes focused on your responsibility.
- Prefer small, readable files.

{FILE_FORMAT}"#,
        responsibility = responsibility(role),
    )
}

/// Prompt asking a role to repair files that failed validation.
pub fn repair_prompt(fix_request: &str, affected_files: &str) -> String {
    format!(
        r#"Automated validation found errors in files you own. Fix them.

## Issues
{fix_request}

## Current Files
{affected_files_section}

## Instructions
- Fix every listed issue.
- Return only the files you changed, each in full.

{FILE_FORMAT}"#,
        affected_files_section = if affected_files.is_empty() {
            "(no file contents available)".to_string()
        } else {
            affected_files.to_string()
        }
    )
}
