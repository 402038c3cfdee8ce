//! Allow/deny rule grammar and single-rule matching.
//!
//! Grammar:
//!
//! ```text
//! rule     := tool | tool "(" content ")"
//! tool     := name | "mcp__" server | "mcp__" server "__" (name | "*")
//! content  := any text; "\(" and "\)" escape parentheses; "*" means "any";
//!             a trailing ":*" marks an explicit prefix rule
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::request::ToolInvocationRequest;
use crate::mcp::parse_mcp_name;

const PREFIX_SUFFIX: &str = ":*";
const WILDCARD: &str = "*";

fn tool_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z0-9_\-.]+|mcp__[A-Za-z0-9_\-.]+__\*)$").expect("valid tool name regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("malformed rule '{rule}': {reason}")]
    Malformed { rule: String, reason: &'static str },
}

impl RuleError {
    fn malformed(rule: &str, reason: &'static str) -> Self {
        Self::Malformed {
            rule: rule.to_string(),
            reason,
        }
    }
}

/// How a rule matched a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Rule has no content qualifier and applies to the whole tool.
    Tool,
    /// Rule content equals the request content.
    Exact,
    /// Request content starts with the rule content at a word boundary.
    Prefix,
}

/// A parsed allow/deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub tool_name: String,
    pub rule_content: Option<String>,
}

impl Rule {
    pub fn new(tool_name: impl Into<String>, rule_content: Option<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            rule_content,
        }
    }

    pub fn tool(tool_name: impl Into<String>) -> Self {
        Self::new(tool_name, None)
    }

    pub fn with_content(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(tool_name, Some(content.into()))
    }

    /// The rule that would exactly cover `request` if persisted.
    pub fn for_request(request: &ToolInvocationRequest) -> Self {
        Self::new(request.tool_name(), request.rule_content().map(str::to_string))
    }

    pub fn parse(input: &str) -> Result<Self, RuleError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(RuleError::malformed(input, "empty rule"));
        }

        let (tool, content) = match find_unescaped(s, '(') {
            None => {
                if find_unescaped(s, ')').is_some() {
                    return Err(RuleError::malformed(input, "unbalanced parentheses"));
                }
                (s, None)
            }
            Some(open) => {
                if !ends_with_unescaped_close(s) {
                    return Err(RuleError::malformed(input, "text after closing parenthesis"));
                }
                let raw = &s[open + 1..s.len() - 1];
                if !balanced(raw) {
                    return Err(RuleError::malformed(input, "unbalanced parentheses"));
                }
                let content = unescape(raw);
                if content.is_empty() {
                    return Err(RuleError::malformed(input, "empty rule content"));
                }
                (&s[..open], Some(content))
            }
        };

        if !tool_name_regex().is_match(tool) {
            return Err(RuleError::malformed(input, "invalid tool name"));
        }

        let content = content.filter(|c| c != WILDCARD);
        let rule = Self::new(tool, content);
        if rule.mcp_wildcard_server().is_some() && rule.rule_content.is_some() {
            return Err(RuleError::malformed(input, "wildcard rules take no content"));
        }
        Ok(rule)
    }

    /// Server name for `mcp__<server>__*` rules.
    pub fn mcp_wildcard_server(&self) -> Option<&str> {
        match parse_mcp_name(&self.tool_name) {
            Some((server, WILDCARD)) => Some(server),
            _ => None,
        }
    }

    /// Server name for `mcp__<server>` rules without a tool segment.
    fn mcp_server_only(&self) -> Option<&str> {
        let server = self.tool_name.strip_prefix(crate::mcp::MCP_TOOL_PREFIX)?;
        (!server.is_empty() && !server.contains("__")).then_some(server)
    }

    pub fn matches(&self, request: &ToolInvocationRequest) -> bool {
        self.match_kind(request.tool_name(), request.rule_content())
            .is_some()
    }

    pub fn match_kind(&self, tool_name: &str, content: Option<&str>) -> Option<MatchKind> {
        if let Some(server) = self.mcp_wildcard_server().or_else(|| self.mcp_server_only()) {
            let (req_server, _) = parse_mcp_name(tool_name)?;
            return (req_server == server).then_some(MatchKind::Tool);
        }

        if self.tool_name != tool_name {
            return None;
        }

        let Some(rule_content) = self.rule_content.as_deref() else {
            return Some(MatchKind::Tool);
        };
        let content = content?;

        if let Some(prefix) = rule_content.strip_suffix(PREFIX_SUFFIX) {
            if content == prefix {
                return Some(MatchKind::Exact);
            }
            return prefix_at_boundary(prefix, content).then_some(MatchKind::Prefix);
        }

        if content == rule_content {
            Some(MatchKind::Exact)
        } else if prefix_at_boundary(rule_content, content) {
            Some(MatchKind::Prefix)
        } else {
            None
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule_content {
            Some(content) => write!(f, "{}({})", self.tool_name, escape(content)),
            None => f.write_str(&self.tool_name),
        }
    }
}

impl FromStr for Rule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn prefix_at_boundary(prefix: &str, content: &str) -> bool {
    if prefix.is_empty() || !content.starts_with(prefix) {
        return false;
    }
    let last = prefix.chars().next_back();
    let next = content[prefix.len()..].chars().next();
    match (last, next) {
        (Some(l), Some(n)) => is_word_char(l) != is_word_char(n),
        _ => false,
    }
}

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == target {
            return Some(i);
        }
    }
    None
}

fn balanced(s: &str) -> bool {
    let mut depth: i32 = 0;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn ends_with_unescaped_close(s: &str) -> bool {
    let mut escaped = false;
    let mut last_close = None;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ')' {
            last_close = Some(i);
        }
    }
    last_close == Some(s.len() - 1)
}

/// Only `\\`, `\(` and `\)` are escapes; any other backslash is literal.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && matches!(next, '\\' | '(' | ')')
        {
            out.push(next);
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bash(command: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::builder("Bash")
            .rule_content(command)
            .build()
    }

    #[test]
    fn test_parse_tool_only() {
        let rule = Rule::parse("Read").unwrap();
        assert_eq!(rule.tool_name, "Read");
        assert_eq!(rule.rule_content, None);
        assert_eq!(rule.to_string(), "Read");
    }

    #[test]
    fn test_parse_with_content() {
        let rule = Rule::parse("Bash(git status)").unwrap();
        assert_eq!(rule.tool_name, "Bash");
        assert_eq!(rule.rule_content.as_deref(), Some("git status"));
        assert_eq!(rule.to_string(), "Bash(git status)");
    }

    #[test]
    fn test_parse_escaped_parentheses() {
        let rule = Rule::parse(r"Bash(echo \(hi\))").unwrap();
        assert_eq!(rule.rule_content.as_deref(), Some("echo (hi)"));
        assert_eq!(rule.to_string(), r"Bash(echo \(hi\))");
        assert_eq!(Rule::parse(&rule.to_string()).unwrap(), rule);
    }

    #[test]
    fn test_trailing_backslash_round_trips() {
        let rule = Rule::new("Bash", Some(r"echo foo\".to_string()));
        assert_eq!(rule.to_string(), r"Bash(echo foo\\)");
        assert_eq!(Rule::parse(&rule.to_string()).unwrap(), rule);

        let rule = Rule::new("Bash", Some(r"printf 'a\)'".to_string()));
        assert_eq!(Rule::parse(&rule.to_string()).unwrap(), rule);
    }

    #[test]
    fn test_lone_backslash_is_literal() {
        let rule = Rule::parse(r"Bash(grep a\.b)").unwrap();
        assert_eq!(rule.rule_content.as_deref(), Some(r"grep a\.b"));
        assert!(matches!(
            Rule::parse(r"Bash(echo foo\)"),
            Err(RuleError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_star_content_is_whole_tool() {
        assert_eq!(Rule::parse("Bash(*)").unwrap(), Rule::tool("Bash"));
    }

    #[test]
    fn test_parse_mcp_forms() {
        let wildcard = Rule::parse("mcp__github__*").unwrap();
        assert_eq!(wildcard.mcp_wildcard_server(), Some("github"));

        let server = Rule::parse("mcp__github").unwrap();
        assert_eq!(server.mcp_wildcard_server(), None);

        let tool = Rule::parse("mcp__github__create_issue").unwrap();
        assert_eq!(tool.mcp_wildcard_server(), None);
    }

    #[test]
    fn test_parse_malformed() {
        for bad in [
            "",
            "   ",
            "Bash(",
            "Bash)",
            "Bash(git",
            "Bash(git) status",
            "Bash()",
            "Ba*sh",
            "Bash((x)",
            "mcp__github__*(x)",
            "Tool Name",
        ] {
            assert!(
                matches!(Rule::parse(bad), Err(RuleError::Malformed { .. })),
                "expected malformed: {bad:?}"
            );
        }
    }

    #[test]
    fn test_exact_match() {
        let rule = Rule::parse("Bash(git status)").unwrap();
        assert_eq!(
            rule.match_kind("Bash", Some("git status")),
            Some(MatchKind::Exact)
        );
        assert!(rule.matches(&bash("git status")));
        assert!(!rule.matches(&bash("git stash")));
    }

    #[test]
    fn test_prefix_requires_word_boundary() {
        let rule = Rule::parse("Bash(git)").unwrap();
        assert_eq!(
            rule.match_kind("Bash", Some("git status")),
            Some(MatchKind::Prefix)
        );
        assert!(rule.matches(&bash("git log -1")));
        assert!(!rule.matches(&bash("gitk")));
        assert!(!rule.matches(&bash("git_helper")));
    }

    #[test]
    fn test_prefix_ending_in_non_word_char() {
        let rule = Rule::parse("Bash(ls -)").unwrap();
        assert!(rule.matches(&bash("ls -la")));
        assert!(!rule.matches(&bash("ls --")));
    }

    #[test]
    fn test_explicit_prefix_suffix() {
        let rule = Rule::parse("Bash(npm run:*)").unwrap();
        assert!(rule.matches(&bash("npm run")));
        assert!(rule.matches(&bash("npm run build")));
        assert!(!rule.matches(&bash("npm runx")));
        assert!(!rule.matches(&bash("npm install")));
    }

    #[test]
    fn test_tool_rule_matches_any_content() {
        let rule = Rule::tool("Bash");
        assert_eq!(rule.match_kind("Bash", Some("rm -rf /")), Some(MatchKind::Tool));
        assert_eq!(rule.match_kind("Bash", None), Some(MatchKind::Tool));
    }

    #[test]
    fn test_content_rule_needs_request_content() {
        let rule = Rule::parse("Bash(git)").unwrap();
        assert_eq!(rule.match_kind("Bash", None), None);
    }

    #[test]
    fn test_case_sensitive() {
        let rule = Rule::parse("Bash(git)").unwrap();
        assert!(!rule.matches(&bash("GIT status")));
        assert_eq!(rule.match_kind("bash", Some("git")), None);
    }

    #[test]
    fn test_mcp_wildcard_match() {
        let rule = Rule::parse("mcp__github__*").unwrap();
        assert_eq!(
            rule.match_kind("mcp__github__create_issue", None),
            Some(MatchKind::Tool)
        );
        assert_eq!(rule.match_kind("mcp__githubx__create_issue", None), None);
        assert_eq!(rule.match_kind("mcp__gitlab__create_issue", None), None);
        assert_eq!(rule.match_kind("Bash", None), None);
    }

    #[test]
    fn test_mcp_server_rule_match() {
        let rule = Rule::parse("mcp__github").unwrap();
        assert!(rule.match_kind("mcp__github__list_prs", None).is_some());
        assert!(rule.match_kind("mcp__other__list_prs", None).is_none());
    }

    #[test]
    fn test_mcp_tool_rule_is_exact() {
        let rule = Rule::parse("mcp__github__create_issue").unwrap();
        assert!(rule.match_kind("mcp__github__create_issue", None).is_some());
        assert!(rule.match_kind("mcp__github__close_issue", None).is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let rule: Rule = serde_json::from_str("\"Bash(git status)\"").unwrap();
        assert_eq!(rule, Rule::with_content("Bash", "git status"));
        assert_eq!(serde_json::to_string(&rule).unwrap(), "\"Bash(git status)\"");
        assert!(serde_json::from_str::<Rule>("\"Bash(\"").is_err());
    }
}
