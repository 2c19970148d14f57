pub(crate) mod consumer;

use serde::Deserialize;

/// One message = one grading batch for one session. Produced by the upstream
/// session API when a session closes.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GradeRequest {
    pub(crate) session_token: String,
    pub(crate) session_id: i64,
    pub(crate) organization_id: i64,
}

impl GradeRequest {
    pub(crate) fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_well_formed_payload() {
        let body = br#"{"session_token": "tok-1", "session_id": 7, "organization_id": 3}"#;
        let request = GradeRequest::decode(body).expect("decode");
        assert_eq!(request.session_token, "tok-1");
        assert_eq!(request.session_id, 7);
        assert_eq!(request.organization_id, 3);
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert!(GradeRequest::decode(br#"{"session_token": "tok-1"}"#).is_err());
    }

    #[test]
    fn decode_rejects_non_json_body() {
        assert!(GradeRequest::decode(b"not json").is_err());
    }
}
