use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

// Directories holding this crate's own Rust sources. Nothing else is linted.
const SOURCE_DIRS: [&str; 4] = ["ibd", "cli", "tests", "benches"];

// Words that must never appear in comments.
const FORBIDDEN_COMMENT_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

// Which rule a collector enforces. Each rule has its own report wording.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenWord,
    StarsInComment,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn summary(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => "underscore-prefixed identifiers",
            Rule::ForbiddenWord => "forbidden comment words",
            Rule::StarsInComment => "'**' patterns in regular comments",
            Rule::AllCapsComment => "comments with all uppercase alphabetic characters",
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Underscore-prefixed names are not allowed in this project.\n   Either use the binding (removing the underscore) or remove it completely."
            }
            Rule::ForbiddenWord => {
                "Comments narrating edits (FIX, NEW, UPDATE and friends) are not allowed.\n   Remove them completely rather than commenting them out."
            }
            Rule::StarsInComment => {
                "The '**' pattern is not allowed in regular comments (it is allowed in doc comments)."
            }
            Rule::AllCapsComment => {
                "Comments where all alphabetic characters are uppercase are not allowed.\n   Strongly consider deleting the comment completely."
            }
            Rule::AllowDeadCode => {
                "#[allow(dead_code)] is not allowed in this project.\n   Either use the code (removing the attribute) or remove it completely."
            }
        }
    }
}

// A grep sink collecting every offending line of one file for one rule.
struct ViolationCollector {
    rule: Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.summary(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice()));
        Some(error_msg)
    }

    // Decides whether a matched line really breaks the rule.
    fn is_violation(&self, line_text: &str) -> bool {
        match self.rule {
            Rule::UnderscorePrefix => !is_comment(line_text) && !underscore_only_in_strings(line_text),
            Rule::ForbiddenWord | Rule::AllowDeadCode => true,
            Rule::StarsInComment => !is_doc_comment(line_text),
            Rule::AllCapsComment => match comment_text(line_text) {
                Some(text) => {
                    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
                    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
                }
                None => false,
            },
        }
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

// True when every underscore on the line sits inside a string literal.
fn underscore_only_in_strings(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .all(|(_, code)| !has_prefixed_identifier(code))
}

fn has_prefixed_identifier(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        let starts_word = i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
        let followed = bytes
            .get(i + 1)
            .is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_');
        b == b'_' && starts_word && followed
    })
}

// The text of a comment on this line, without its leading marker.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for marker in ["///", "//!", "//"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let start = line.find("/*")?;
    let body = &line[start + 2..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

fn rust_sources() -> impl Iterator<Item = DirEntry> {
    SOURCE_DIRS
        .into_iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
}

fn scan(rule: Rule, pattern: &str) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();
    for entry in rust_sources() {
        let path = entry.path();
        let mut collector = ViolationCollector::new(rule, path);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let forbidden_words = format!(
        r"(//|/\*).*(?:{})",
        FORBIDDEN_COMMENT_WORDS.join("|")
    );
    let checks = [
        (Rule::UnderscorePrefix, r"\b(_[a-zA-Z0-9_]+)\b".to_string()),
        (Rule::ForbiddenWord, forbidden_words),
        (Rule::StarsInComment, r"(//|/\*).*\*\*".to_string()),
        (Rule::AllCapsComment, r"(//|/\*).*".to_string()),
        (
            Rule::AllowDeadCode,
            r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        ),
    ];

    for (rule, pattern) in &checks {
        if let Err(e) = scan(*rule, pattern) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
