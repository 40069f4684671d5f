//! Building shell command lines from argument lists.

/// Quote a string for safe use as a single shell word.
///
/// Strings made only of safe characters are returned unchanged; anything
/// else is single-quoted with embedded single quotes escaped.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=@:,+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Turn command-line arguments into a command string for `sh -c`.
///
/// A single argument is taken as a complete command line and passed through
/// verbatim, so `agentbox exec -- 'ls | wc -l'` keeps its pipe. Multiple
/// arguments are quoted individually to preserve their boundaries.
pub fn command_line(parts: &[String]) -> String {
    match parts {
        [single] => single.clone(),
        _ => parts
            .iter()
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
