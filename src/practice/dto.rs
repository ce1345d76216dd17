use serde::{Deserialize, Serialize};

/// One grammar or vocabulary finding tied to a specific sentence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceFeedback {
    pub sentence: String,
    pub feedback: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerAnalysis {
    pub question: String,
    pub answer: String,
    pub grammar_feedback: Vec<SentenceFeedback>,
    pub vocabulary_feedback: Vec<SentenceFeedback>,
    pub fluency_feedback: String,
}

/// The fixed contract the provider must fill in. Every field is required;
/// score ranges are the provider's responsibility and are not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackResponse {
    pub overall_band_score: f64,
    pub fluency_score: i32,
    pub lexical_score: i32,
    pub grammar_score: i32,
    pub pronunciation_score: i32,
    pub general_summary: String,
    pub answer_analyses: Vec<AnswerAnalysis>,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_response_roundtrip() {
        let json = r#"{
            "overall_band_score": 6.5,
            "fluency_score": 6,
            "lexical_score": 7,
            "grammar_score": 6,
            "pronunciation_score": 7,
            "general_summary": "Solid performance with minor slips.",
            "answer_analyses": [
                {
                    "question": "Do you work or study?",
                    "answer": "I am work in a bank.",
                    "grammar_feedback": [
                        {
                            "sentence": "I am work in a bank.",
                            "feedback": "Incorrect verb form",
                            "suggestion": "I work in a bank."
                        }
                    ],
                    "vocabulary_feedback": [],
                    "fluency_feedback": "Generally smooth delivery."
                }
            ]
        }"#;
        let parsed: FeedbackResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.overall_band_score, 6.5);
        assert_eq!(parsed.answer_analyses.len(), 1);
        assert!(parsed.answer_analyses[0].vocabulary_feedback.is_empty());
    }

    #[test]
    fn feedback_response_requires_all_fields() {
        // A bare object is not an acceptable provider response.
        assert!(serde_json::from_str::<FeedbackResponse>("{}").is_err());
        assert!(
            serde_json::from_str::<FeedbackResponse>(r#"{"overall_band_score": 7.0}"#).is_err()
        );
    }
}
