//! Grounded prompt construction
//!
//! Every user turn is rewritten into a single prompt that carries the
//! retrieved professor records inline, so the model answers from the review
//! data instead of inventing professors.

use crate::professor::ProfessorRecord;

/// Fixed persona and formatting rules, sent once per session rather than
/// repeated in every turn.
pub const SYSTEM_INSTRUCTION: &str = "\
You are the Rate My Professor support assistant. You help students find the \
best professors for their needs. Each user query arrives together with the \
professor records retrieved from the review database for that query; base \
your recommendations only on those records.

For every question:
1. Recommend the top 3 professors that best match the query, or fewer if \
fewer are provided.
2. For each recommendation, give the professor's name, the subject they \
teach, their star rating, and a brief highlight drawn from their review.
3. If no records are provided, say that nothing matched and suggest how the \
student could rephrase, instead of inventing professors.

Keep responses concise and easy to compare.";

/// Line inserted in place of records when retrieval finds nothing. The
/// model sees an explicit statement, not an empty section.
pub const NO_MATCH_SENTINEL: &str = "No professors found matching your request.";

/// Combine the user's query with its retrieval results into one prompt.
pub fn build_grounded_prompt(user_query: &str, results: &[ProfessorRecord]) -> String {
    let mut prompt = String::new();

    prompt.push_str("User Query: ");
    prompt.push_str(user_query);
    prompt.push_str("\n\nRelevant Professors based on your query:\n");

    if results.is_empty() {
        prompt.push_str(NO_MATCH_SENTINEL);
        prompt.push('\n');
    } else {
        for record in results {
            prompt.push_str(&format!(
                "Professor: {}\nSubject: {}\nRating: {} stars\nReview: {}\n\n",
                record.name, record.subject, record.rating, record.review_text
            ));
        }
    }

    prompt.push_str(
        "\nGenerate a response based on the user's query and the professor data \
         above. Provide the best matches or suggest alternatives if no direct \
         match is found.",
    );

    prompt
}
