//! Collector acknowledgement check.

use serde_json::Value;

/// Returns true if `response` acknowledges a payload.
///
/// A JSON object is judged by its `status` field, which must be a string
/// containing `success`. Anything that is not a JSON object falls back to a
/// loose check: the line mentions `"status"` and contains `success`.
#[must_use]
pub fn is_success_ack(response: &str) -> bool {
    let trimmed = response.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        return obj
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|status| status.contains("success"));
    }
    trimmed.contains("\"status\"") && trimmed.contains("success")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"{"status":"success"}"#, true ; "plain success")]
    #[test_case(r#"{"status":"success","inserted":2}"#, true ; "success with extra fields")]
    #[test_case(r#"{"status":"partial_success"}"#, true ; "status containing success")]
    #[test_case(r#"  {"status": "success"}  "#, true ; "surrounding whitespace")]
    #[test_case(r#"{"status":"error","message":"success later"}"#, false ; "error status")]
    #[test_case(r#"{"status":1}"#, false ; "non string status")]
    #[test_case(r#"{"result":"success"}"#, false ; "no status field")]
    #[test_case(r#"OK "status" success"#, true ; "non json loose match")]
    #[test_case(r#"{"status":"success""#, true ; "truncated json loose match")]
    #[test_case("success", false ; "bare word")]
    #[test_case("", false ; "empty line")]
    fn classifies_response(response: &str, expected: bool) {
        assert_eq!(is_success_ack(response), expected);
    }
}
