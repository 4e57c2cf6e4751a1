//! Rendering of `elm make --report=json` output.
//!
//! Two shapes exist: `compile-errors` (per-module problem lists) and
//! `error` (one general failure such as a broken `elm.json`). Anything that
//! does not parse is passed through verbatim.

use std::path::Path;

use serde::Deserialize;

const HEADER_WIDTH: usize = 80;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Report {
    CompileErrors { errors: Vec<ModuleErrors> },
    Error {
        #[serde(default)]
        path: Option<String>,
        title: String,
        message: Vec<Chunk>,
    },
}

#[derive(Debug, Deserialize)]
struct ModuleErrors {
    path: String,
    problems: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
struct Problem {
    title: String,
    #[serde(default)]
    region: Option<Region>,
    message: Vec<Chunk>,
}

#[derive(Debug, Deserialize)]
struct Region {
    start: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    line: u32,
    column: u32,
}

/// Plain text or styled text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Chunk {
    Plain(String),
    Styled { string: String },
}

impl Chunk {
    fn text(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Styled { string: s } => s,
        }
    }
}

/// Human-readable text for compiler stderr. Paths are shown relative to
/// `root` when possible.
pub fn render(stderr: &str, root: &Path) -> String {
    let trimmed = stderr.trim();
    let Ok(report) = serde_json::from_str::<Report>(trimmed) else {
        return trimmed.to_string();
    };

    match report {
        Report::CompileErrors { errors } => errors
            .iter()
            .flat_map(|module| {
                let path = relative(&module.path, root);
                module.problems.iter().map(move |problem| {
                    let location = problem
                        .region
                        .as_ref()
                        .map(|r| format!("{path}:{}:{}", r.start.line, r.start.column))
                        .unwrap_or_else(|| path.clone());
                    format!("{}\n\n{}", header(&problem.title, &location), message(&problem.message))
                })
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Report::Error {
            path,
            title,
            message: chunks,
        } => {
            let location = path.map(|p| relative(&p, root)).unwrap_or_default();
            format!("{}\n\n{}", header(&title, &location), message(&chunks))
        }
    }
}

/// `-- TITLE ------------ location`
fn header(title: &str, location: &str) -> String {
    let used = 3 + title.chars().count() + 1 + location.chars().count() + 1;
    let dashes = "-".repeat(HEADER_WIDTH.saturating_sub(used).max(1));
    if location.is_empty() {
        format!("-- {title} {dashes}")
    } else {
        format!("-- {title} {dashes} {location}")
    }
}

fn message(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::text).collect::<String>().trim_end().to_string()
}

fn relative(path: &str, root: &Path) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_errors() {
        let json = r#"{"type":"compile-errors","errors":[{"path":"/app/src/Main.elm","name":"Main","problems":[{"title":"TYPE MISMATCH","region":{"start":{"line":12,"column":5},"end":{"line":12,"column":9}},"message":["The value is a ",{"bold":false,"underline":false,"color":"yellow","string":"String"}," but should be an Int.\n"]}]}]}"#;
        let text = render(json, Path::new("/app"));
        let mut lines = text.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("-- TYPE MISMATCH -"));
        assert!(first.ends_with(" src/Main.elm:12:5"));
        assert_eq!(first.chars().count(), HEADER_WIDTH);
        assert!(text.ends_with("The value is a String but should be an Int."));
    }

    #[test]
    fn test_general_error() {
        let json = r#"{"type":"error","path":"elm.json","title":"UNKNOWN PACKAGE","message":["No package named ",{"bold":true,"underline":false,"color":null,"string":"elm/nope"}]}"#;
        let text = render(json, Path::new("/app"));
        assert!(text.starts_with("-- UNKNOWN PACKAGE "));
        assert!(text.contains("elm.json"));
        assert!(text.ends_with("No package named elm/nope"));
    }

    #[test]
    fn test_general_error_without_path() {
        let json = r#"{"type":"error","path":null,"title":"NO INPUT","message":["Nothing to do."]}"#;
        let text = render(json, Path::new("/app"));
        assert!(text.starts_with("-- NO INPUT ---"));
        assert!(text.ends_with("Nothing to do."));
    }

    #[test]
    fn test_non_json_passthrough() {
        assert_eq!(render("  elm: segfault\n", Path::new("/")), "elm: segfault");
    }

    #[test]
    fn test_multiple_problems_joined() {
        let json = r#"{"type":"compile-errors","errors":[{"path":"/a/A.elm","name":"A","problems":[{"title":"ONE","message":["x"]},{"title":"TWO","message":["y"]}]}]}"#;
        let text = render(json, Path::new("/a"));
        assert!(text.contains("-- ONE"));
        assert!(text.contains("-- TWO"));
        assert_eq!(text.matches("A.elm").count(), 2);
    }
}
