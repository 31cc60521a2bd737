//! Prompt context rendering

use super::SearchResult;

/// Rendered when retrieval finds nothing
pub const NO_RELEVANT_CONTEXT: &str = "No relevant context found.";

/// Separator between rendered chunks
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Render the top `max_chunks` results as numbered blocks:
///
/// ```text
/// [1] (1.6%): first chunk
///
/// ---
///
/// [2] (1.1%): second chunk
/// ```
///
/// The percentage is the fused score times 100, one decimal place.
pub fn render_context(results: &[SearchResult], max_chunks: usize) -> String {
    if results.is_empty() || max_chunks == 0 {
        return NO_RELEVANT_CONTEXT.to_string();
    }

    results
        .iter()
        .take(max_chunks)
        .enumerate()
        .map(|(i, r)| format!("[{}] ({:.1}%): {}", i + 1, r.score * 100.0, r.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}
