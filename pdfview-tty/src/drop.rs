use std::path::PathBuf;

use tracing::debug;
use url::Url;

/// Turns the text a terminal pastes when files are dragged onto it into
/// paths. Terminals differ: some paste `file://` URLs one per line, others
/// shell-quoted or backslash-escaped paths separated by spaces.
pub fn parse_dropped_paths(pasted: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for line in pasted.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for token in split_shell_words(line) {
            if let Some(path) = token_to_path(&token) {
                paths.push(path);
            }
        }
    }
    debug!(count = paths.len(), "parsed dropped paths");
    paths
}

fn token_to_path(token: &str) -> Option<PathBuf> {
    if token.starts_with("file://") {
        return Url::parse(token).ok()?.to_file_path().ok();
    }
    if token.is_empty() {
        None
    } else {
        Some(PathBuf::from(token))
    }
}

fn split_shell_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path() {
        assert_eq!(
            parse_dropped_paths("/home/ana/paper.pdf"),
            vec![PathBuf::from("/home/ana/paper.pdf")]
        );
    }

    #[test]
    fn escaped_and_quoted_spaces() {
        assert_eq!(
            parse_dropped_paths("/tmp/My\\ Paper.pdf '/tmp/other doc.pdf'"),
            vec![
                PathBuf::from("/tmp/My Paper.pdf"),
                PathBuf::from("/tmp/other doc.pdf")
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_are_percent_decoded() {
        assert_eq!(
            parse_dropped_paths("file:///tmp/My%20Paper.pdf\r\nfile:///tmp/b.pdf\n"),
            vec![PathBuf::from("/tmp/My Paper.pdf"), PathBuf::from("/tmp/b.pdf")]
        );
    }

    #[test]
    fn blank_paste_yields_nothing() {
        assert!(parse_dropped_paths("  \n\t\n").is_empty());
    }
}
