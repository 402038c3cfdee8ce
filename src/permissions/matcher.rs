//! Evaluate every configured rule against a request.

use super::request::ToolInvocationRequest;
use super::rule::{MatchKind, Rule};
use crate::config::{EffectiveConfig, SourcedRule};

const CONTROL_OPERATORS: &[&str] = &[";", "&", "|", "\n", "`", "(", ">"];

/// Characters that start a new command segment. Substitutions and subshells
/// run their contents as separate commands.
const SEGMENT_BREAKS: &[char] = &[';', '&', '|', '\n', '`', '(', ')', '<', '>', '{', '}'];

/// All allow and deny rules that apply to one request.
///
/// Always computed in full; callers decide precedence afterwards.
#[derive(Debug, Default)]
pub struct RuleMatches<'a> {
    pub allow: Vec<&'a SourcedRule>,
    pub deny: Vec<&'a SourcedRule>,
}

impl<'a> RuleMatches<'a> {
    pub fn is_denied(&self) -> bool {
        !self.deny.is_empty()
    }

    pub fn is_allowed(&self) -> bool {
        !self.allow.is_empty()
    }

    pub fn first_deny(&self) -> Option<&'a SourcedRule> {
        self.deny.first().copied()
    }

    pub fn first_allow(&self) -> Option<&'a SourcedRule> {
        self.allow.first().copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher;

impl RuleMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Whether `rule` applies to `request`, ignoring allow/deny direction.
    pub fn matches(&self, rule: &Rule, request: &ToolInvocationRequest) -> bool {
        rule.matches(request)
    }

    pub fn evaluate<'a>(
        &self,
        config: &'a EffectiveConfig,
        request: &ToolInvocationRequest,
    ) -> RuleMatches<'a> {
        RuleMatches {
            allow: config
                .allow_rules
                .iter()
                .filter(|r| self.allow_matches(&r.rule, request))
                .collect(),
            deny: config
                .deny_rules
                .iter()
                .filter(|r| self.deny_matches(&r.rule, request))
                .collect(),
        }
    }

    /// A prefix allow rule never approves a compound shell command: `git`
    /// must not cover `git status && rm -rf ~`.
    fn allow_matches(&self, rule: &Rule, request: &ToolInvocationRequest) -> bool {
        match rule.match_kind(request.tool_name(), request.rule_content()) {
            Some(MatchKind::Prefix) => !(request.is_shell()
                && request.rule_content().is_some_and(has_control_operators)),
            Some(_) => true,
            None => false,
        }
    }

    /// A deny rule matches if it matches the whole command or any
    /// sub-command of it.
    fn deny_matches(&self, rule: &Rule, request: &ToolInvocationRequest) -> bool {
        if rule.matches(request) {
            return true;
        }
        if !request.is_shell() {
            return false;
        }
        let Some(command) = request.rule_content() else {
            return false;
        };
        split_compound(command)
            .into_iter()
            .any(|segment| rule.match_kind(request.tool_name(), Some(segment)).is_some())
    }
}

fn has_control_operators(command: &str) -> bool {
    CONTROL_OPERATORS.iter().any(|op| command.contains(op))
}

fn split_compound(command: &str) -> Vec<&str> {
    command
        .split(SEGMENT_BREAKS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScopeConfig, ScopeSnapshot};

    fn effective(allow: &[&str], deny: &[&str]) -> EffectiveConfig {
        EffectiveConfig::merge(&ScopeSnapshot {
            local: ScopeConfig {
                allow_rules: allow.iter().map(|s| s.to_string()).collect(),
                deny_rules: deny.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn bash(command: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::builder("Bash")
            .rule_content(command)
            .build()
    }

    #[test]
    fn test_collects_all_matches() {
        let config = effective(&["Bash", "Bash(git)", "Read"], &["Bash(git push)"]);
        let matches = RuleMatcher::new().evaluate(&config, &bash("git push origin"));
        assert_eq!(matches.allow.len(), 2);
        assert_eq!(matches.deny.len(), 1);
        assert!(matches.is_denied());
        assert!(matches.is_allowed());
    }

    #[test]
    fn test_no_matches() {
        let config = effective(&["Read"], &["Write"]);
        let matches = RuleMatcher::new().evaluate(&config, &bash("ls"));
        assert!(!matches.is_allowed());
        assert!(!matches.is_denied());
    }

    #[test]
    fn test_prefix_allow_rejects_compound_command() {
        let config = effective(&["Bash(git)"], &[]);
        let matcher = RuleMatcher::new();
        assert!(matcher.evaluate(&config, &bash("git status")).is_allowed());
        for compound in [
            "git status && rm -rf ~",
            "git status; curl evil",
            "git log | sh",
            "git status > /etc/passwd",
            "git $(whoami)",
        ] {
            assert!(
                !matcher.evaluate(&config, &bash(compound)).is_allowed(),
                "{compound:?}"
            );
        }
    }

    #[test]
    fn test_exact_allow_covers_compound_command() {
        let config = effective(&["Bash(make && make test)"], &[]);
        let matches = RuleMatcher::new().evaluate(&config, &bash("make && make test"));
        assert!(matches.is_allowed());
    }

    #[test]
    fn test_deny_matches_sub_command() {
        let config = effective(&[], &["Bash(rm:*)"]);
        let matcher = RuleMatcher::new();
        assert!(matcher.evaluate(&config, &bash("git status && rm -rf x")).is_denied());
        assert!(matcher.evaluate(&config, &bash("ls | rm y")).is_denied());
        assert!(!matcher.evaluate(&config, &bash("ls -la")).is_denied());
    }

    #[test]
    fn test_non_shell_tools_skip_compound_logic() {
        let config = effective(&["Read(src)"], &[]);
        let request = ToolInvocationRequest::builder("Read")
            .rule_content("src/a;b.rs")
            .build();
        assert!(RuleMatcher::new().evaluate(&config, &request).is_allowed());
    }

    #[test]
    fn test_mcp_wildcard_through_matcher() {
        let config = effective(&[], &["mcp__evil__*"]);
        let request = ToolInvocationRequest::builder("mcp__evil__exfiltrate").build();
        assert!(RuleMatcher::new().evaluate(&config, &request).is_denied());
    }

    #[test]
    fn test_split_compound() {
        assert_eq!(
            split_compound("a && b || c; d | e\nf"),
            vec!["a", "b", "c", "d", "e", "f"]
        );
        assert_eq!(split_compound("  "), Vec::<&str>::new());
        assert_eq!(split_compound("echo $(rm -rf x)"), vec!["echo $", "rm -rf x"]);
        assert_eq!(split_compound("cat <(ls)"), vec!["cat", "ls"]);
    }

    #[test]
    fn test_deny_matches_substitution_and_subshell() {
        let config = effective(&["Bash"], &["Bash(rm:*)"]);
        let matcher = RuleMatcher::new();
        for command in ["echo $(rm -rf x)", "echo `rm -rf x`", "(rm -rf x)", "{ rm -rf x; }"] {
            let matches = matcher.evaluate(&config, &bash(command));
            assert!(matches.is_denied(), "{command} should be denied");
        }

        let matches = matcher.evaluate(&config, &bash("echo $(ls)"));
        assert!(!matches.is_denied());
        assert!(matches.is_allowed());
    }

    #[test]
    fn test_prefix_allow_rejects_process_substitution() {
        let config = effective(&["Bash(cat:*)"], &[]);
        let matches = RuleMatcher::new().evaluate(&config, &bash("cat <(rm -rf x)"));
        assert!(!matches.is_allowed());
    }
}
