use crate::database::RetrievedPassage;

const RESPONSE_MARKER: &str = "Response:";

pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            format!(
                "Context {} (Score: {:.2}): {}",
                i + 1,
                passage.score,
                passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "University Policy PDF Handbook context:\n{context}\n\n\
         Student Query:\n{question}\n\n\
         University AI Assistant Instructions:\n\
         1. You are an AI assistant for university students, helping with administrative tasks and policies.\n\
         2. Your ONLY knowledge source is the provided university policy handbook.\n\
         3. For administrative requests, identify and collect ALL required information:\n   \
         - Recommendation Letters: student name, course name, professor name\n   \
         - Make-up Exams: student name, course name, valid reason\n\
         4. Support these 3 query types:\n   \
         a) General questions (policies, rules)\n   \
         b) Administrative requests (recommendation letters, make-up exams)\n   \
         c) Project/Exam information (courses, project, exam information)\n\
         5. Be precise and concise. If information is missing from the handbook, say \
         'This information is not available in the university handbook.'\n\
         6. Format lists/requirements clearly when applicable.\n\
         7. For procedures, provide exact steps from the handbook.\n\n\
         <|UNIVERSITY_ASSISTANT|>\n\
         {RESPONSE_MARKER}\n"
    )
}

/// Some backends echo the prompt back. Keep what follows the last
/// `Response:` marker.
pub fn extract_answer(raw: &str) -> String {
    match raw.rfind(RESPONSE_MARKER) {
        Some(index) => raw[index + RESPONSE_MARKER.len()..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            id: 1,
            text: text.to_string(),
            score,
            page: Some(0),
            source: None,
        }
    }

    #[test]
    fn test_context_is_numbered_with_scores() {
        let context = format_context(&[
            passage("Letters need form RD-42.", 0.912),
            passage("Submit two weeks in advance.", 0.75),
        ]);
        assert_eq!(
            context,
            "Context 1 (Score: 0.91): Letters need form RD-42.\n\n\
             Context 2 (Score: 0.75): Submit two weeks in advance."
        );
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("Context 1 (Score: 0.90): RD-42", "How do I get a letter?");
        assert!(prompt.starts_with("University Policy PDF Handbook context:\nContext 1 (Score: 0.90): RD-42\n\n"));
        assert!(prompt.contains("Student Query:\nHow do I get a letter?\n\n"));
        assert!(prompt.contains("   - Make-up Exams: student name, course name, valid reason\n"));
        assert!(prompt.contains("'This information is not available in the university handbook.'"));
        assert!(prompt.ends_with("<|UNIVERSITY_ASSISTANT|>\nResponse:\n"));
    }

    #[test]
    fn test_extract_answer_after_echoed_prompt() {
        let raw = format!("{}  Bring form RD-42.  ", build_prompt("ctx", "q"));
        assert_eq!(extract_answer(&raw), "Bring form RD-42.");
    }

    #[test]
    fn test_extract_answer_plain_completion() {
        assert_eq!(extract_answer("\n Bring form RD-42.\n"), "Bring form RD-42.");
    }
}
