//! Classification of generated component text as complete, truncated or
//! syntactically broken, without executing it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

pub mod oracle;

pub use oracle::{BabelOracle, OracleOutcome, SyntaxOracle};

/// Filename hint handed to the oracle so it parses TypeScript + JSX.
pub const ORACLE_FILENAME: &str = "component.tsx";

const BALANCE_REASON: &str = "bracket/quote balance";
const REACT_IMPORT: &str = "import React from 'react';\n\n";

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```([^`\n]*)\r?\n(.*?)```").expect("fenced block regex")
});
static OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```([^`\n]*)\r?\n").expect("open fence regex"));
static FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[^`\n]*\r?$").expect("fence line regex"));
static JSX_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z/>]|\bJSX\b").expect("jsx regex"));
static COMPONENT_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:import\s+React|const\s+\w+|function\s+\w+)").expect("component regex")
});
static EXPORT_STMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:export\s+default|export\s+\{)").expect("export regex"));

/// Tried in order; the first that matches supplies the location.
static LOCATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\((\d+):(\d+)\)", r"line (\d+),?\s*column (\d+)", r":(\d+):(\d+):"]
        .iter()
        .map(|p| Regex::new(p).expect("location regex"))
        .collect()
});

const CODE_LANGUAGES: [&str; 7] = ["", "tsx", "jsx", "ts", "typescript", "js", "javascript"];

const TRUNCATION_MARKERS: [&str; 3] = ["unexpected token", "unterminated", "unexpected end of input"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationResult {
    Complete,
    Truncated { reason: String, location: Option<Location> },
    SyntaxError { reason: String, location: Option<Location> },
}

impl ValidationResult {
    pub fn truncated(reason: impl Into<String>) -> Self {
        ValidationResult::Truncated { reason: reason.into(), location: None }
    }

    pub fn syntax_error(reason: impl Into<String>) -> Self {
        ValidationResult::SyntaxError { reason: reason.into(), location: None }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ValidationResult::Complete => "COMPLETE",
            ValidationResult::Truncated { .. } => "TRUNCATED",
            ValidationResult::SyntaxError { .. } => "SYNTAX_ERROR",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ValidationResult::Complete)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationResult::Complete => None,
            ValidationResult::Truncated { reason, .. } | ValidationResult::SyntaxError { reason, .. } => Some(reason.as_str()),
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            ValidationResult::Complete => None,
            ValidationResult::Truncated { location, .. } | ValidationResult::SyntaxError { location, .. } => *location,
        }
    }

    /// One line for prompts and logs.
    pub fn describe(&self) -> String {
        match (self.reason(), self.location()) {
            (None, _) => self.status().to_string(),
            (Some(r), None) => format!("{}: {}", self.status(), r),
            (Some(r), Some(l)) => format!("{} at line {}, column {}: {}", self.status(), l.line, l.column, r),
        }
    }
}

/// Swappable classification strategy.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn classify(&self, text: &str) -> ValidationResult;
}

/// Model output with narrative and fences removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedSource {
    /// Code exactly as the model wrote it, minus surrounding prose and fences.
    pub body: String,
    /// `body`, with the React import prepended when JSX needs it.
    pub source: String,
    pub injected_import: bool,
}

fn is_code_language(info: &str) -> bool {
    let lang = info.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
    CODE_LANGUAGES.contains(&lang.as_str())
}

/// First closed block tagged as JS/TS (or untagged), then a JS/TS block
/// left open at the end of the text, then the first closed block of any
/// language.
fn first_code_block(text: &str) -> Option<&str> {
    let mut fallback = None;
    let mut tail = 0;
    for caps in FENCED_BLOCK.captures_iter(text) {
        let (Some(whole), Some(info), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else { continue };
        if is_code_language(info.as_str()) {
            return Some(body.as_str());
        }
        fallback.get_or_insert(body.as_str());
        tail = whole.end();
    }
    let rest = &text[tail..];
    if let Some(caps) = OPEN_FENCE.captures(rest) {
        if let (Some(whole), Some(info)) = (caps.get(0), caps.get(1)) {
            if is_code_language(info.as_str()) {
                return Some(&rest[whole.end()..]);
            }
        }
    }
    fallback
}

pub fn clean_for_parsing(text: &str) -> CleanedSource {
    let extracted = match first_code_block(text) {
        Some(block) => block.to_string(),
        None => FENCE_LINE.replace_all(text, "").into_owned(),
    };
    let body = extracted.trim().to_string();

    let injected_import = !body.contains("import React") && JSX_HINT.is_match(&body);
    let source = if injected_import { format!("{REACT_IMPORT}{body}") } else { body.clone() };

    CleanedSource { body, source, injected_import }
}

/// Bracket counts must match and the quote scan must end outside a string.
pub fn balance_check(code: &str) -> Result<(), String> {
    let count = |c: char| code.chars().filter(|&x| x == c).count();
    let mut problems = Vec::new();
    for (open, close) in [('{', '}'), ('(', ')'), ('[', ']')] {
        let (o, c) = (count(open), count(close));
        if o != c {
            problems.push(format!("{o} '{open}' vs {c} '{close}'"));
        }
    }

    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        match quote {
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            Some(q) if ch == q => quote = None,
            _ => {}
        }
    }
    if let Some(q) = quote {
        problems.push(format!("unterminated {q} string"));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("code appears incomplete based on {BALANCE_REASON} ({})", problems.join(", ")))
    }
}

pub fn extract_location(diagnostic: &str) -> Option<Location> {
    LOCATION_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(diagnostic)?;
        Some(Location {
            line: caps.get(1)?.as_str().parse().ok()?,
            column: caps.get(2)?.as_str().parse().ok()?,
        })
    })
}

pub fn looks_truncated(diagnostic: &str) -> bool {
    let lower = diagnostic.to_lowercase();
    TRUNCATION_MARKERS.iter().any(|m| lower.contains(m))
}

/// Maps a finished oracle run onto a verdict.
pub fn classify_oracle_outcome(outcome: &OracleOutcome, min_output_len: usize) -> ValidationResult {
    match outcome {
        OracleOutcome::Accepted { output } => {
            if output.trim().len() > min_output_len {
                ValidationResult::Complete
            } else {
                ValidationResult::syntax_error("empty output from syntax oracle")
            }
        }
        OracleOutcome::Rejected { diagnostic } => {
            let location = extract_location(diagnostic);
            let reason = diagnostic.trim().to_string();
            if looks_truncated(diagnostic) {
                ValidationResult::Truncated { reason, location }
            } else {
                ValidationResult::SyntaxError { reason, location }
            }
        }
    }
}

fn classify_by_patterns(body: &str) -> ValidationResult {
    let mut missing = Vec::new();
    if !COMPONENT_DEF.is_match(body) {
        missing.push("component definition");
    }
    if !EXPORT_STMT.is_match(body) {
        missing.push("export statement");
    }
    if missing.is_empty() {
        ValidationResult::Complete
    } else {
        ValidationResult::truncated(format!("missing {}", missing.join(" and ")))
    }
}

/// Pattern-only validator, used when no oracle is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicValidator;

#[async_trait]
impl Validator for HeuristicValidator {
    async fn classify(&self, text: &str) -> ValidationResult {
        CompletionValidator::without_oracle().classify(text).await
    }
}

/// Pre-filter, balance scan, then the oracle when present or patterns when not.
pub struct CompletionValidator {
    oracle: Option<Box<dyn SyntaxOracle>>,
    min_output_len: usize,
}

impl CompletionValidator {
    pub fn new(oracle: Option<Box<dyn SyntaxOracle>>, min_output_len: usize) -> Self {
        Self { oracle, min_output_len }
    }

    pub fn without_oracle() -> Self {
        Self { oracle: None, min_output_len: 0 }
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }
}

#[async_trait]
impl Validator for CompletionValidator {
    async fn classify(&self, text: &str) -> ValidationResult {
        if text.trim().is_empty() {
            return ValidationResult::syntax_error("empty input");
        }

        let cleaned = clean_for_parsing(text);
        if let Err(reason) = balance_check(&cleaned.source) {
            return ValidationResult::truncated(reason);
        }

        if let Some(oracle) = &self.oracle {
            match oracle.check(ORACLE_FILENAME, &cleaned.source).await {
                Ok(outcome) => return classify_oracle_outcome(&outcome, self.min_output_len),
                Err(e) => debug!(error = %e, "syntax oracle failed, using pattern fallback"),
            }
        }

        classify_by_patterns(&cleaned.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OracleError;

    const BUTTON: &str = "import React from 'react';\n\nconst Button = ({ children }) => {\n    return <button>{children}</button>;\n};\n\nexport default Button;\n";

    struct FixedOracle(Result<OracleOutcome, ()>);

    #[async_trait]
    impl SyntaxOracle for FixedOracle {
        async fn check(&self, _hint: &str, _source: &str) -> Result<OracleOutcome, OracleError> {
            self.0.clone().map_err(|_| OracleError::Unavailable("gone".into()))
        }
    }

    fn with_oracle(outcome: Result<OracleOutcome, ()>) -> CompletionValidator {
        CompletionValidator::new(Some(Box::new(FixedOracle(outcome))), 10)
    }

    fn rejected(diag: &str) -> Result<OracleOutcome, ()> {
        Ok(OracleOutcome::Rejected { diagnostic: diag.into() })
    }

    #[tokio::test]
    async fn empty_input_is_syntax_error() {
        for text in ["", "   \n\t"] {
            let r = HeuristicValidator.classify(text).await;
            assert_eq!(r.status(), "SYNTAX_ERROR");
            assert!(r.reason().unwrap().contains("empty"));
        }
    }

    #[tokio::test]
    async fn unbalanced_brace_is_truncated() {
        let r = HeuristicValidator.classify("const A = () => <div>{x").await;
        assert_eq!(r.status(), "TRUNCATED");
        assert!(r.reason().unwrap().contains("bracket/quote balance"));
    }

    #[tokio::test]
    async fn cut_off_jsx_with_balanced_braces_is_still_truncated() {
        // braces pair up, so the export check is what catches it
        let r = HeuristicValidator.classify("const A = () => <div>{x}").await;
        assert_eq!(r.status(), "TRUNCATED");
        assert!(r.reason().unwrap().contains("export"));
    }

    #[tokio::test]
    async fn balance_failure_skips_oracle() {
        let v = with_oracle(Ok(OracleOutcome::Accepted { output: "x".repeat(100) }));
        let r = v.classify("function A() { return (1;\n}").await;
        assert_eq!(r.status(), "TRUNCATED");
    }

    #[test]
    fn odd_quotes_of_one_kind_fail_balance() {
        assert!(balance_check("const a = \"abc;").is_err());
        assert!(balance_check("const a = 'abc;").is_err());
        assert!(balance_check("const a = 'a\\'bc';").is_ok());
        assert!(balance_check("const a = \"it's\";").is_ok());
        assert!(balance_check("const A = \"'\";\nexport default A;").is_ok());
    }

    #[test]
    fn balanced_counts_pass_prefilter() {
        assert!(balance_check("}{)(][").is_ok());
        assert!(balance_check("const x = { a: [1, (2)] };").is_ok());
    }

    #[tokio::test]
    async fn complete_component_without_oracle() {
        let r = HeuristicValidator.classify(BUTTON).await;
        assert_eq!(r, ValidationResult::Complete);
    }

    #[tokio::test]
    async fn missing_export_is_truncated_without_oracle() {
        let r = HeuristicValidator.classify("const Button = () => <button>Go</button>;").await;
        assert_eq!(r.status(), "TRUNCATED");
        assert!(r.reason().unwrap().contains("export"));
    }

    #[tokio::test]
    async fn heuristic_is_idempotent() {
        for text in [BUTTON, "const A = () => <div>{x}", "", "export default 1"] {
            let a = HeuristicValidator.classify(text).await;
            let b = HeuristicValidator.classify(text).await;
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn oracle_unexpected_token_maps_to_truncated_with_location() {
        let v = with_oracle(rejected("SyntaxError: /tmp/x.tsx: Unexpected token (12:5)"));
        let r = v.classify(BUTTON).await;
        assert_eq!(r.status(), "TRUNCATED");
        assert_eq!(r.location(), Some(Location { line: 12, column: 5 }));
    }

    #[tokio::test]
    async fn other_oracle_failure_is_syntax_error() {
        let v = with_oracle(rejected("SyntaxError: Identifier 'Button' has already been declared. (7:6)"));
        let r = v.classify(BUTTON).await;
        assert_eq!(r.status(), "SYNTAX_ERROR");
        assert_eq!(r.location(), Some(Location { line: 7, column: 6 }));

        let v = with_oracle(rejected("something odd happened"));
        assert_eq!(v.classify(BUTTON).await.location(), None);
    }

    #[tokio::test]
    async fn tiny_oracle_output_is_syntax_error() {
        let v = with_oracle(Ok(OracleOutcome::Accepted { output: "  \"use\"  ".into() }));
        let r = v.classify(BUTTON).await;
        assert_eq!(r.status(), "SYNTAX_ERROR");
        assert!(r.reason().unwrap().contains("empty output"));
    }

    #[tokio::test]
    async fn oracle_success_is_complete() {
        let v = with_oracle(Ok(OracleOutcome::Accepted { output: "var Button = function () {};".into() }));
        assert!(v.classify(BUTTON).await.is_complete());
    }

    #[tokio::test]
    async fn unavailable_oracle_falls_back_to_patterns() {
        let v = with_oracle(Err(()));
        assert!(v.classify(BUTTON).await.is_complete());
        let r = v.classify("const x = 1;").await;
        assert_eq!(r.status(), "TRUNCATED");
    }

    #[test]
    fn location_patterns_in_order() {
        assert_eq!(extract_location("at (3:14) and line 9, column 2"), Some(Location { line: 3, column: 14 }));
        assert_eq!(extract_location("error on line 9, column 2"), Some(Location { line: 9, column: 2 }));
        assert_eq!(extract_location("line 9 column 2"), Some(Location { line: 9, column: 2 }));
        assert_eq!(extract_location("component.tsx:4:11: bad"), Some(Location { line: 4, column: 11 }));
        assert_eq!(extract_location("no location"), None);
    }

    #[test]
    fn truncation_markers_are_case_insensitive() {
        assert!(looks_truncated("Unterminated string constant"));
        assert!(looks_truncated("unexpected end of input"));
        assert!(!looks_truncated("Missing semicolon"));
    }

    #[test]
    fn extracts_first_fenced_block() {
        let text = "Here you go:\n```tsx\nconst A = 1;\n```\nand more\n```js\nconst B = 2;\n```";
        let c = clean_for_parsing(text);
        assert_eq!(c.body, "const A = 1;");
        assert!(!c.injected_import);
    }

    #[test]
    fn skips_non_code_block_before_component() {
        let text = "Install:\n```bash\nnpm i lodash\n```\n```tsx\nconst A = () => <div/>;\nexport default A;\n```";
        let c = clean_for_parsing(text);
        assert_eq!(c.body, "const A = () => <div/>;\nexport default A;");
        assert!(c.injected_import);
    }

    #[tokio::test]
    async fn install_steps_before_component_still_complete() {
        let text = "Install:\n```bash\nnpm i lodash\n```\n```tsx\nconst A = () => <div/>;\nexport default A;\n```";
        assert!(HeuristicValidator.classify(text).await.is_complete());
    }

    #[test]
    fn unclosed_component_after_install_block() {
        let c = clean_for_parsing("Install:\n```bash\nnpm i lodash\n```\n```tsx\nconst A = () => <div>{x");
        assert_eq!(c.body, "const A = () => <div>{x");
    }

    #[test]
    fn falls_back_to_first_block_of_any_language() {
        let c = clean_for_parsing("Run this:\n```python\nprint(1)\n```\nthen\n```sh\nls\n```");
        assert_eq!(c.body, "print(1)");

        let c = clean_for_parsing("```\nconst A = 1;\n```");
        assert_eq!(c.body, "const A = 1;");
    }

    #[test]
    fn strips_unclosed_fence() {
        let c = clean_for_parsing("```jsx\nexport default function A() { return 1 }");
        assert_eq!(c.body, "export default function A() { return 1 }");
    }

    #[test]
    fn injects_react_import_for_jsx_only() {
        let c = clean_for_parsing("const A = () => <div/>;");
        assert!(c.injected_import);
        assert!(c.source.starts_with("import React from 'react';"));
        assert!(c.source.ends_with(&c.body));

        assert!(!clean_for_parsing("const a = b < 3;").injected_import);
        assert!(!clean_for_parsing(BUTTON).injected_import);
    }

    #[test]
    fn status_serializes_in_upper_snake_case() {
        let v = serde_json::to_value(ValidationResult::truncated("x")).unwrap();
        assert_eq!(v["status"], "TRUNCATED");
        let v = serde_json::to_value(ValidationResult::Complete).unwrap();
        assert_eq!(v["status"], "COMPLETE");
    }
}
