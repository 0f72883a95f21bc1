//! Drive requests through the scripted transport using the JSON vectors in
//! `test-vectors/`.
//!
//! `decode.json` covers type sniffing and body decoding; `lifecycle.json`
//! covers the order of readyState transitions and events as the transport
//! state changes between polls.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use pollxhr_core::scripted::Script;
use pollxhr_core::{
    EventKind, ManualClock, Outcome, Response, ResponseType, TransportResult, XmlHttpRequest,
};

const URL: &str = "http://example.com/resource";

fn parse_response_type(value: &serde_json::Value) -> Option<ResponseType> {
    value.as_str().map(|s| s.parse().unwrap())
}

fn parse_result(s: &str) -> TransportResult {
    match s {
        "connection_error" => TransportResult::ConnectionError,
        "protocol_error" => TransportResult::ProtocolError,
        "data_processing_error" => TransportResult::DataProcessingError,
        other => panic!("unknown transport result: {other}"),
    }
}

fn parse_outcome(s: &str) -> Outcome {
    match s {
        "load" => Outcome::Load,
        "error" => Outcome::Error,
        "timeout" => Outcome::Timeout,
        "abort" => Outcome::Abort,
        other => panic!("unknown outcome: {other}"),
    }
}

fn headers(value: &serde_json::Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let pair = h.as_array().unwrap();
            (
                pair[0].as_str().unwrap().to_string(),
                pair[1].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

#[test]
fn decode_test_vectors() {
    let raw = include_str!("../../test-vectors/decode.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let script = Script::new();
        let mut xhr = XmlHttpRequest::new(Rc::new(script.factory()));
        xhr.open("GET", URL).unwrap();
        xhr.set_response_type(parse_response_type(&case["requested"])).unwrap();
        if let Some(mime) = case["override"].as_str() {
            xhr.override_mime_type(mime).unwrap();
        }

        let body = case["body"].as_str().unwrap().to_string();
        match case["content_type"].as_str() {
            Some(ct) => script.respond(200, &[("Content-Type", ct)], body.clone()),
            None => script.respond(200, &[("X-No-Type", "1")], body.clone()),
        }
        xhr.send(None).unwrap();

        assert_eq!(xhr.outcome(), Some(Outcome::Load), "{name}: outcome");
        assert_eq!(
            xhr.response_type(),
            parse_response_type(&case["expected_type"]),
            "{name}: response type"
        );

        let expected = &case["expected_response"];
        let actual = xhr.response();
        match expected["kind"].as_str().unwrap() {
            "null" => assert!(actual.is_null(), "{name}: expected null, got {actual:?}"),
            "text" => assert_eq!(
                actual,
                &Response::Text(expected["value"].as_str().unwrap().to_string()),
                "{name}: text"
            ),
            "json" => assert_eq!(actual, &Response::Json(expected["value"].clone()), "{name}: json"),
            "bytes" => assert_eq!(
                actual.as_bytes().map(|b| b.to_vec()),
                Some(expected["value"].as_str().unwrap().as_bytes().to_vec()),
                "{name}: bytes"
            ),
            other => panic!("{name}: unknown response kind {other}"),
        }
        // The raw text is always kept, whatever the decoded form.
        assert_eq!(xhr.response_text(), Some(body), "{name}: response text");
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn label(kind: EventKind, ready_state: u8) -> String {
    if kind == EventKind::ReadyStateChange {
        format!("{kind}:{ready_state}")
    } else {
        kind.to_string()
    }
}

#[test]
fn lifecycle_test_vectors() {
    let raw = include_str!("../../test-vectors/lifecycle.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let script = Script::new();
        let clock = ManualClock::new();
        let mut xhr = XmlHttpRequest::new(Rc::new(script.factory()))
            .with_clock(Rc::new(clock.clone()))
            .with_poll_interval(Duration::from_millis(10));

        let fired: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let fired = fired.clone();
            xhr.add_event_listener(
                kind,
                move |e| fired.borrow_mut().push(label(e.kind, e.ready_state.as_u8())),
                false,
            );
        }

        xhr.open(case["method"].as_str().unwrap(), URL).unwrap();
        xhr.set_timeout(case["timeout_ms"].as_u64().unwrap());
        xhr.send(None).unwrap();

        let take = || std::mem::take(&mut *fired.borrow_mut());
        let expected_after_send: Vec<String> = serde_json::from_value(case["after_send"].clone()).unwrap();
        assert_eq!(take(), expected_after_send, "{name}: after send");

        for (i, step) in case["steps"].as_array().unwrap().iter().enumerate() {
            if let Some(status) = step["status"].as_u64() {
                script.set_status(status as u16);
            }
            if !step["headers"].is_null() {
                script.state_mut().response_headers = headers(&step["headers"]);
            }
            if let Some(progress) = step["progress"].as_f64() {
                script.set_progress(progress as f32);
            }
            if let Some(body) = step["complete"].as_str() {
                script.complete(body.to_string());
            }
            if let Some(result) = step["fail"].as_str() {
                script.fail(parse_result(result));
            }

            clock.advance_ms(step["advance_ms"].as_u64().unwrap_or(10));
            xhr.poll();

            let expected: Vec<String> = serde_json::from_value(step["expect"].clone()).unwrap();
            assert_eq!(take(), expected, "{name}: step {i}");
        }

        let fin = &case["final"];
        assert_eq!(u64::from(xhr.status()), fin["status"].as_u64().unwrap(), "{name}: status");
        assert_eq!(
            u64::from(xhr.ready_state().as_u8()),
            fin["ready_state"].as_u64().unwrap(),
            "{name}: ready state"
        );
        assert_eq!(
            xhr.outcome(),
            Some(parse_outcome(fin["outcome"].as_str().unwrap())),
            "{name}: outcome"
        );
        assert!(!xhr.is_active(), "{name}: still polling");
        assert_eq!(script.state().dispose_count, 1, "{name}: disposed once");
    }
}
