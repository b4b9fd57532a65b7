/// Keep the head and tail of `output` when it exceeds `limit` characters.
/// Cuts on char boundaries.
pub fn truncate_output(output: &str, limit: usize) -> String {
    let total = output.chars().count();
    if total <= limit {
        return output.to_string();
    }
    let half = limit / 2;
    let start: String = output.chars().take(half).collect();
    let end: String = output.chars().skip(total - half).collect();
    format!("{}\n\n... [truncated {} chars] ...\n\n{}", start, total - half * 2, end)
}

/// Single-line prefix of `text`, for log messages.
pub fn truncate_line(text: &str, limit: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(limit).collect();
    if line.chars().count() > limit || text.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}
