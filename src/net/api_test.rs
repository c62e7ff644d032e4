use super::*;

#[test]
fn decode_history_reads_messages_in_order() {
    let body = br#"{"ok":true,"data":[
        {"id":1,"from_user":"Alice","text":"rent is due","time":"09:00 AM","created_at":"2024-01-10T09:00:00Z","delivered":false,"seen":true},
        {"id":2,"from_user":"Bob","text":"paid","time":"09:05 AM","created_at":"2024-01-10T09:05:00Z","delivered":false,"seen":false}
    ]}"#;
    let messages = decode_history(body).expect("history");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "1");
    assert_eq!(messages[0].from_user, "Alice");
    assert!(messages[0].seen);
    assert_eq!(messages[1].text, "paid");
}

#[test]
fn decode_history_null_data_is_empty() {
    assert!(decode_history(br#"{"ok":true,"data":null}"#).expect("history").is_empty());
    assert!(decode_history(br#"{"ok":true}"#).expect("history").is_empty());
}

#[test]
fn decode_history_rejects_not_ok() {
    assert!(matches!(decode_history(br#"{"ok":false,"data":[]}"#), Err(ApiError::NotOk)));
    assert!(matches!(decode_history(br#"{"data":[]}"#), Err(ApiError::NotOk)));
}

#[test]
fn decode_history_rejects_garbage() {
    assert!(matches!(decode_history(b"<html>"), Err(ApiError::Json(_))));
}

#[tokio::test]
async fn fetch_history_degrades_to_empty_when_unreachable() {
    // Bind then drop a listener so the port is known to refuse connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = ClientConfig::default().with_api_base(format!("http://{addr}"));
    let http = reqwest::Client::new();
    assert!(matches!(try_fetch_history(&http, &config).await, Err(ApiError::Http(_))));
    assert!(fetch_history(&http, &config).await.is_empty());
}
