use std::path::Path;

/// Unified diff between the current document text and the text a write
/// would produce. Pure; used for dry-run previews and confirmation.
pub fn render_unified(before: &str, after: &str, path: &Path) -> String {
    let name = path.display().to_string();
    let diff = similar::TextDiff::from_lines(before, after);
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::render_unified;
    use std::path::Path;

    #[test]
    fn diff_marks_inserted_lines() {
        let before = "{\n  \"a\": 1\n}\n";
        let after = "{\n  \"a\": 1,\n  \"b\": 2\n}\n";
        let diff = render_unified(before, after, Path::new(".cursor/mcp.json"));
        assert!(diff.contains("a/.cursor/mcp.json"));
        assert!(diff.contains("+  \"b\": 2"));
    }

    #[test]
    fn identical_texts_produce_empty_diff() {
        let text = "{\n  \"a\": 1\n}\n";
        assert!(render_unified(text, text, Path::new("x.json")).is_empty());
    }
}
