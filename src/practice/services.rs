use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, warn};

use crate::ai::{AiError, FeedbackProvider};
use crate::conversations::dto::QaPair;
use crate::practice::dto::FeedbackResponse;

const NOT_CONFIGURED_SUMMARY: &str = "AI service is not configured.";
const ERROR_SUMMARY: &str = "An error occurred generating feedback.";

/// Serializes the transcript as alternating examiner/student lines.
fn render_transcript(conversation: &[QaPair]) -> String {
    conversation
        .iter()
        .map(|turn| {
            let question = if turn.question.is_empty() {
                "N/A"
            } else {
                &turn.question
            };
            let answer = if turn.answer.is_empty() {
                "N/A"
            } else {
                &turn.answer
            };
            format!("Examiner: {question}\nStudent: {answer}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(conversation: &[QaPair]) -> String {
    let transcript = render_transcript(conversation);
    format!(
        r#"You are an expert IELTS examiner providing a detailed, sentence-by-sentence analysis of a student's performance.
Analyze the following transcript.

--- TRANSCRIPT ---
{transcript}
--- END TRANSCRIPT ---

Your task is to return ONLY a JSON object with the following structure. Do not include any text before or after the JSON.

{{
  "overall_band_score": <float from 4.0-9.0>,
  "fluency_score": <integer from 4-9>,
  "lexical_score": <integer from 4-9>,
  "grammar_score": <integer from 4-9>,
  "pronunciation_score": <integer from 4-9>,
  "general_summary": "<A concise summary of the student's overall performance.>",
  "answer_analyses": [
    {{
      "question": "<The first examiner question>",
      "answer": "<The student's full answer to the first question>",
      "grammar_feedback": [
        {{
          "sentence": "<The specific sentence from the student's answer with a grammatical error>",
          "feedback": "<A brief explanation of the error (e.g., 'Incorrect verb tense')>",
          "suggestion": "<The corrected version of the sentence>"
        }}
      ],
      "vocabulary_feedback": [
        {{
          "sentence": "<The specific sentence where vocabulary could be improved>",
          "feedback": "<Explanation of why it could be improved (e.g., 'Repetitive word choice')>",
          "suggestion": "<The same sentence but with more advanced or appropriate vocabulary>"
        }}
      ],
      "fluency_feedback": "<A brief comment on the fluency and coherence of this specific answer>"
    }}
  ]
}}

VERY IMPORTANT INSTRUCTIONS:
1.  Go through EACH question and answer pair and create one entry in the "answer_analyses" array for it.
2.  For "grammar_feedback" and "vocabulary_feedback", if you find NO errors or areas for improvement for a specific answer, you MUST return an empty array: [].
3.  DO NOT invent errors. If the grammar or vocabulary is perfect for an answer, the corresponding arrays should be empty."#
    )
}

/// Providers wrap their JSON in prose and leave trailing commas behind.
/// Takes the first `{` through the last `}` and strips trailing commas;
/// no braces at all degrades to the empty object.
pub fn clean_json_response(text: &str) -> String {
    lazy_static! {
        static ref TRAILING_COMMA_RE: Regex = Regex::new(r",\s*([}\]])").unwrap();
    }
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return "{}".into();
    };
    if start > end {
        return "{}".into();
    }
    let json_str = &text[start..=end];
    TRAILING_COMMA_RE.replace_all(json_str, "$1").into_owned()
}

pub fn fallback_response(summary: &str) -> FeedbackResponse {
    FeedbackResponse {
        overall_band_score: 0.0,
        fluency_score: 0,
        lexical_score: 0,
        grammar_score: 0,
        pronunciation_score: 0,
        general_summary: summary.to_string(),
        answer_analyses: Vec::new(),
    }
}

/// Always yields a well-formed response: provider or parsing failures map to
/// the zero-valued fallback rather than an error for the caller.
pub async fn final_feedback(
    provider: &dyn FeedbackProvider,
    conversation: &[QaPair],
) -> FeedbackResponse {
    let prompt = build_prompt(conversation);

    let raw = match provider.generate(&prompt).await {
        Ok(text) => text,
        Err(AiError::NotConfigured) => {
            warn!("feedback requested but AI provider is not configured");
            return fallback_response(NOT_CONFIGURED_SUMMARY);
        }
        Err(e) => {
            error!(error = %e, "feedback generation failed");
            return fallback_response(ERROR_SUMMARY);
        }
    };

    let cleaned = clean_json_response(&raw);
    match serde_json::from_str::<FeedbackResponse>(&cleaned) {
        Ok(feedback) => feedback,
        Err(e) => {
            error!(error = %e, "could not parse feedback response");
            fallback_response(ERROR_SUMMARY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn turn(question: &str, answer: &str) -> QaPair {
        QaPair {
            question: question.into(),
            answer: answer.into(),
            part: None,
            topic: None,
            answer_length: None,
            response_time: None,
        }
    }

    #[test]
    fn clean_discards_prose_and_trailing_comma() {
        let cleaned = clean_json_response(r#"blah {"overall_band_score": 7.0,} trailing"#);
        assert_eq!(cleaned, r#"{"overall_band_score": 7.0}"#);
        let value: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["overall_band_score"], 7.0);
    }

    #[test]
    fn clean_strips_trailing_commas_in_arrays_too() {
        let cleaned = clean_json_response(r#"{"scores": [6, 7, ], "x": {"y": 1,},}"#);
        let value: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value["scores"], serde_json::json!([6, 7]));
        assert_eq!(value["x"]["y"], 1);
    }

    #[test]
    fn clean_handles_code_fences() {
        let raw = "```json\n{\"general_summary\": \"ok\"}\n```";
        let cleaned = clean_json_response(raw);
        assert_eq!(cleaned, r#"{"general_summary": "ok"}"#);
    }

    #[test]
    fn clean_without_braces_yields_empty_object() {
        assert_eq!(clean_json_response("no json here"), "{}");
        assert_eq!(clean_json_response(""), "{}");
        assert_eq!(clean_json_response("} {"), "{}");
    }

    #[test]
    fn clean_passes_valid_json_through() {
        let raw = r#"{"a": [1, 2], "b": "x, y"}"#;
        assert_eq!(clean_json_response(raw), raw);
    }

    #[test]
    fn prompt_embeds_transcript_and_rules() {
        let prompt = build_prompt(&[
            turn("Where are you from?", "I come from Da Nang."),
            turn("Do you like it?", "Yes, very much."),
        ]);
        assert!(prompt.contains("Examiner: Where are you from?\nStudent: I come from Da Nang."));
        assert!(prompt.contains("Examiner: Do you like it?\nStudent: Yes, very much."));
        assert!(prompt.contains("return ONLY a JSON object"));
        assert!(prompt.contains("DO NOT invent errors"));
        assert!(prompt.contains("\"answer_analyses\""));
    }

    #[test]
    fn prompt_substitutes_na_for_empty_turns() {
        let prompt = build_prompt(&[turn("", "")]);
        assert!(prompt.contains("Examiner: N/A\nStudent: N/A"));
    }

    #[test]
    fn fallback_is_zero_valued() {
        let fb = fallback_response(ERROR_SUMMARY);
        assert_eq!(fb.overall_band_score, 0.0);
        assert_eq!(fb.fluency_score, 0);
        assert_eq!(fb.lexical_score, 0);
        assert_eq!(fb.grammar_score, 0);
        assert_eq!(fb.pronunciation_score, 0);
        assert_eq!(fb.general_summary, ERROR_SUMMARY);
        assert!(fb.answer_analyses.is_empty());
    }

    struct CannedProvider(Result<String, AiError>);

    #[async_trait]
    impl FeedbackProvider for CannedProvider {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            self.0.clone()
        }
    }

    const VALID_PROVIDER_OUTPUT: &str = r#"Sure! Here is the analysis:
    {
      "overall_band_score": 7.5,
      "fluency_score": 7,
      "lexical_score": 8,
      "grammar_score": 7,
      "pronunciation_score": 7,
      "general_summary": "Strong answers overall.",
      "answer_analyses": [],
    }
    Hope this helps!"#;

    #[tokio::test]
    async fn final_feedback_parses_wrapped_provider_output() {
        let provider = CannedProvider(Ok(VALID_PROVIDER_OUTPUT.into()));
        let fb = final_feedback(&provider, &[turn("Q", "A")]).await;
        assert_eq!(fb.overall_band_score, 7.5);
        assert_eq!(fb.general_summary, "Strong answers overall.");
    }

    #[tokio::test]
    async fn final_feedback_falls_back_when_unconfigured() {
        let provider = CannedProvider(Err(AiError::NotConfigured));
        let fb = final_feedback(&provider, &[turn("Q", "A")]).await;
        assert_eq!(fb, fallback_response(NOT_CONFIGURED_SUMMARY));
    }

    #[tokio::test]
    async fn final_feedback_falls_back_on_transport_error() {
        let provider = CannedProvider(Err(AiError::Transport("502".into())));
        let fb = final_feedback(&provider, &[turn("Q", "A")]).await;
        assert_eq!(fb, fallback_response(ERROR_SUMMARY));
    }

    #[tokio::test]
    async fn final_feedback_falls_back_on_unparseable_output() {
        let provider = CannedProvider(Ok("I'd rather write an essay than JSON.".into()));
        let fb = final_feedback(&provider, &[turn("Q", "A")]).await;
        assert_eq!(fb, fallback_response(ERROR_SUMMARY));
    }
}
