use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One examiner/student turn. Wire names are the mobile client's camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    pub part: Option<i32>,
    pub topic: Option<String>,
    #[serde(rename = "answerLength")]
    pub answer_length: Option<i32>,
    #[serde(rename = "responseTime")]
    pub response_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationPayload {
    pub conversation: Vec<QaPair>,
}

#[derive(Debug, Serialize)]
pub struct ConversationRead {
    pub id: Uuid,
    pub conversation: Vec<QaPair>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_pair_uses_client_wire_names() {
        let json = r#"{
            "question": "Where do you live?",
            "answer": "I live in Hanoi.",
            "part": 1,
            "topic": "hometown",
            "answerLength": 4,
            "responseTime": 2.5
        }"#;
        let pair: QaPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.answer_length, Some(4));
        assert_eq!(pair.response_time, Some(2.5));

        let back = serde_json::to_value(&pair).unwrap();
        assert!(back.get("answerLength").is_some());
        assert!(back.get("responseTime").is_some());
        assert!(back.get("answer_length").is_none());
    }

    #[test]
    fn optional_turn_fields_may_be_absent() {
        let pair: QaPair =
            serde_json::from_str(r#"{"question":"Q","answer":"A"}"#).unwrap();
        assert_eq!(pair.part, None);
        assert_eq!(pair.topic, None);
    }
}
