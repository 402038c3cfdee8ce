//! MCP (Model Context Protocol) tool naming and server approval.

pub mod approval;

pub use approval::{McpApprovalRegistry, McpServerApprovalStatus};

pub(crate) const MCP_TOOL_PREFIX: &str = "mcp__";

/// Parse MCP qualified name (mcp__server__tool) into (server, tool)
pub fn parse_mcp_name(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(MCP_TOOL_PREFIX)?.split_once("__")
}

/// Create MCP qualified name from server and tool names
pub fn make_mcp_name(server: &str, tool: &str) -> String {
    format!("{}{server}__{tool}", MCP_TOOL_PREFIX)
}

/// Check if a name matches MCP naming pattern
pub fn is_mcp_name(name: &str) -> bool {
    name.starts_with(MCP_TOOL_PREFIX)
}

/// Wildcard rule covering every tool of `server`.
pub fn server_wildcard(server: &str) -> String {
    make_mcp_name(server, "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mcp_name() {
        assert_eq!(
            parse_mcp_name("mcp__server__tool"),
            Some(("server", "tool"))
        );
        assert_eq!(
            parse_mcp_name("mcp__fs__read_file"),
            Some(("fs", "read_file"))
        );
        assert_eq!(parse_mcp_name("mcp__github__*"), Some(("github", "*")));
        assert_eq!(parse_mcp_name("mcp__github"), None);
        assert_eq!(parse_mcp_name("Read"), None);
        assert_eq!(parse_mcp_name("mcp_invalid"), None);
    }

    #[test]
    fn test_make_mcp_name() {
        assert_eq!(make_mcp_name("server", "tool"), "mcp__server__tool");
        assert_eq!(server_wildcard("github"), "mcp__github__*");
    }

    #[test]
    fn test_is_mcp_name() {
        assert!(is_mcp_name("mcp__server__tool"));
        assert!(!is_mcp_name("Read"));
        assert!(!is_mcp_name("mcp_invalid"));
    }
}
