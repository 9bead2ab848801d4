//! Helpers for composing remote shell commands and POSIX paths.

pub fn escape_shell_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Joins POSIX path segments; an absolute `tail` replaces nothing, it is
/// appended below `base`.
pub fn posix_join(base: &str, tail: &str) -> String {
    let base = base.trim_end_matches('/');
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    if base.is_empty() {
        return format!("/{}", tail);
    }
    format!("{}/{}", base, tail)
}

/// Parent directory of `path`. A bare name lives in the login directory, `.`.
pub fn posix_parent(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Some("/".to_string());
    }
    let Some(idx) = trimmed.rfind('/') else {
        return Some(".".to_string());
    };
    if idx == 0 {
        return Some("/".to_string());
    }
    Some(trimmed[..idx].to_string())
}

pub fn posix_file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_shell_value_quotes_single_quotes() {
        assert_eq!(escape_shell_value("plain"), "'plain'");
        assert_eq!(escape_shell_value("it's"), "'it'\\''s'");
    }

    #[test]
    fn posix_join_handles_slashes() {
        assert_eq!(posix_join("/opt/app", "cfg/app.yml"), "/opt/app/cfg/app.yml");
        assert_eq!(posix_join("/opt/app/", "/cfg/app.yml"), "/opt/app/cfg/app.yml");
        assert_eq!(posix_join("/", "app.yml"), "/app.yml");
    }

    #[test]
    fn posix_parent_and_file_name() {
        assert_eq!(posix_parent("/opt/app/cfg/app.yml").as_deref(), Some("/opt/app/cfg"));
        assert_eq!(posix_parent("/app.yml").as_deref(), Some("/"));
        assert_eq!(posix_parent("app.yml").as_deref(), Some("."));
        assert_eq!(posix_parent("cfg/app.yml").as_deref(), Some("cfg"));
        assert_eq!(posix_parent(""), None);
        assert_eq!(posix_file_name("/opt/app/cfg/app.yml"), Some("app.yml"));
        assert_eq!(posix_file_name("/"), None);
    }
}
