//! Final prompt wrapping the assembled context and the user's question.

const PREAMBLE: &str = "You are an assistant that answers questions using the content of the user's documents.";

const INSTRUCTIONS: &str = "Answer using only the document content above. \
If the documents do not contain the information needed, say so explicitly instead of guessing. \
Keep the answer accurate and concise.";

/// Wrap `context` and the literal `question` into the generation prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    let context = if context.trim().is_empty() {
        "(no document content available)"
    } else {
        context
    };
    format!("{PREAMBLE}\n\nContext from uploaded documents:\n{context}\n\nUser Question: {question}\n\n{INSTRUCTIONS}")
}
