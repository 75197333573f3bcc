// Prompt templates for the interview module. All calls go through the
// TextGenerator capability; system prompts come from llm_client::prompts.

use crate::models::interview::Answer;

/// Evaluation prompt. Replace `{category}`, `{level}`, `{total}` and `{transcript}`.
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"You are an interview expert evaluating a candidate's mock interview.

Interview information:
- Position: {category}
- Level: {level}
- Total questions: {total}

Questions and answers:
{transcript}

Return a JSON object with this EXACT schema (no extra fields):
{
  "overall_score": <number 0-100>,
  "overall_grade": "<A+, A, A-, B+, B, B-, C+, C, C-, D, F>",
  "evaluations": [
    {
      "category": "Content Quality",
      "score": <number 0-100>,
      "max_score": 100,
      "feedback": "<detailed feedback>",
      "strengths": ["<strength>", "..."],
      "improvements": ["<improvement>", "..."]
    },
    { "category": "Communication Skills", ... },
    { "category": "Relevance & Focus", ... },
    { "category": "Problem Solving Approach", ... },
    { "category": "Confidence & Enthusiasm", ... }
  ],
  "summary": "<overall summary, 2-3 sentences>",
  "recommendations": ["<actionable recommendation>", "..."]
}

Evaluation criteria:
1. Content Quality: depth of technical knowledge, concrete examples, described impact.
2. Communication Skills: clarity, structure, vocabulary, professional language; penalise filler words.
3. Relevance & Focus: answers the question asked, stays on point, manages time.
4. Problem Solving Approach: systematic thinking, analysis, alternatives, decision making, learning from experience.
5. Confidence & Enthusiasm: self-confidence, enthusiasm for the role, growth mindset.

Grading scale:
- A+ (95-100), A (90-94), A- (85-89), B+ (80-84), B (75-79), B- (70-74),
  C+ (65-69), C (60-64), C- (55-59), D (50-54), F (<50)

Rules:
- Exactly 5 entries in "evaluations", in the order above.
- At least 3 strengths and 2 improvements per category.
- At least 5 specific, actionable recommendations.
- Feedback must be constructive.

Output: return ONLY the JSON object."#;

/// Acknowledgment prompt. Replace `{question}` and `{answer}`.
pub const ACKNOWLEDGMENT_PROMPT_TEMPLATE: &str = r#"You are an objective, critical HR professional conducting an interview.
Respond to the candidate's answer in 1-2 sentences.

Question: {question}
Answer: {answer}

Rules:
- Judge the answer objectively.
- Good, concrete, relevant answer: acknowledge it professionally.
- Vague or generic answer: give firm, constructive feedback.
- Irrelevant or evasive answer: say professionally that it missed the question.
- Formal and polite, at most 2 sentences, no salutation.
- Return the response text only."#;

/// Follow-up question prompt. Replace `{question}` and `{answer}`.
pub const FOLLOW_UP_PROMPT_TEMPLATE: &str = r#"You are a professional HR interviewer. Ask exactly one follow-up question based on the candidate's answer.

Question: {question}
Answer: {answer}

Rules:
- Dig deeper into what the candidate said; be specific to their answer.
- If the answer lacked detail, steer the candidate toward a concrete example.
- Formal and polite but firm, at most 2 sentences, no salutation.
- Do not acknowledge the answer; ask the follow-up question directly.
- Return the question text only."#;

/// Renders answers as numbered Q/A pairs with their spoken durations.
pub fn render_transcript(answers: &[Answer]) -> String {
    answers
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "Q{n}: {q}\nA{n}: {a} ({d}s)",
                n = i + 1,
                q = a.question,
                a = a.transcription,
                d = a.duration
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn evaluation_prompt(category: &str, level: &str, answers: &[Answer]) -> String {
    EVALUATION_PROMPT_TEMPLATE
        .replace("{category}", category)
        .replace("{level}", level)
        .replace("{total}", &answers.len().to_string())
        .replace("{transcript}", &render_transcript(answers))
}

pub fn turn_prompt(question: &str, answer: &str, need_follow_up: bool) -> String {
    let template = if need_follow_up {
        FOLLOW_UP_PROMPT_TEMPLATE
    } else {
        ACKNOWLEDGMENT_PROMPT_TEMPLATE
    };
    template
        .replace("{question}", question)
        .replace("{answer}", answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::evaluation::tests::answer;

    #[test]
    fn test_evaluation_prompt_includes_every_answer() {
        let answers = vec![
            answer("Tell me about yourself", "I build APIs", 60),
            answer("Why Rust?", "Memory safety", 45),
        ];
        let prompt = evaluation_prompt("Backend Engineer", "junior", &answers);

        assert!(prompt.contains("Position: Backend Engineer"));
        assert!(prompt.contains("Total questions: 2"));
        assert!(prompt.contains("Q1: Tell me about yourself\nA1: I build APIs (60s)"));
        assert!(prompt.contains("Q2: Why Rust?\nA2: Memory safety (45s)"));
        assert!(!prompt.contains("{transcript}"));
    }

    #[test]
    fn test_turn_prompt_selects_template() {
        let follow_up = turn_prompt("Q", "A", true);
        let ack = turn_prompt("Q", "A", false);
        assert!(follow_up.contains("follow-up question"));
        assert!(ack.contains("Respond to the candidate's answer"));
        assert!(!ack.contains("{answer}"));
    }
}
