// Platform adapter - OS-specific launch command adjustments
//
// Definitions are written against the POSIX tool names; on Windows some of
// those commands only exist under a different name or as a .cmd shim. The
// mapping lives here so spawn logic stays platform-agnostic.

/// Resolve a configured command to the executable name for the current OS
pub fn resolve_command(command: &str) -> String {
    if cfg!(windows) {
        resolve_windows(command)
    } else {
        command.to_string()
    }
}

fn resolve_windows(command: &str) -> String {
    match command {
        "npm" => "npm.cmd".to_string(),
        "npx" => "npx.cmd".to_string(),
        "yarn" => "yarn.cmd".to_string(),
        "pnpm" => "pnpm.cmd".to_string(),
        "python3" => "python".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_windows_mappings() {
        assert_eq!(resolve_windows("npm"), "npm.cmd");
        assert_eq!(resolve_windows("npx"), "npx.cmd");
        assert_eq!(resolve_windows("python3"), "python");
    }

    #[test]
    fn test_resolve_windows_passthrough() {
        assert_eq!(resolve_windows("node"), "node");
        assert_eq!(resolve_windows("/usr/local/bin/deno"), "/usr/local/bin/deno");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_command_is_identity_on_unix() {
        assert_eq!(resolve_command("npm"), "npm");
        assert_eq!(resolve_command("python3"), "python3");
    }
}
