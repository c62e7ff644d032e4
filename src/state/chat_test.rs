use super::*;

use frames::{Ack, StatusNotice};
use time::macros::datetime;
use tokio::time::{Instant, timeout};

use crate::config::ClientConfig;
use crate::net::transport::WsConnector;

fn session() -> (ChatSession, mpsc::UnboundedSender<ChatEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChatSession::new(rx), tx)
}

fn typing(from: &str) -> ChatEvent {
    ChatEvent::Typing(TypingSignal { from: from.to_owned() })
}

fn message(id: &str, from: &str, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_owned(),
        from_user: from.to_owned(),
        text: text.to_owned(),
        time: "09:00".to_owned(),
        created_at: None,
        delivered: false,
        seen: false,
    }
}

async fn next(session: &mut ChatSession) -> ChatUpdate {
    timeout(Duration::from_secs(30), session.next_update())
        .await
        .expect("update timed out")
        .expect("session open")
}

// =============================================================
// Messages
// =============================================================

#[test]
fn load_history_replaces_messages() {
    let (mut s, _tx) = session();
    s.load_history(vec![message("1", "Alice", "hi")]);
    s.load_history(vec![message("2", "Bob", "yo"), message("3", "Ann", "hey")]);
    let ids: Vec<_> = s.state().messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["2", "3"]);
}

#[tokio::test(start_paused = true)]
async fn inbound_messages_append_in_order_without_dedup() {
    let (mut s, tx) = session();
    s.load_history(vec![message("1", "Alice", "hi")]);

    tx.send(ChatEvent::Message(message("2", "Bob", "yo"))).expect("open");
    tx.send(ChatEvent::Message(message("2", "Bob", "yo"))).expect("open");

    assert_eq!(next(&mut s).await, ChatUpdate::MessageAdded(message("2", "Bob", "yo")));
    assert_eq!(next(&mut s).await, ChatUpdate::MessageAdded(message("2", "Bob", "yo")));
    assert_eq!(s.state().messages.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn ack_seen_and_status_change_nothing() {
    let (mut s, _tx) = session();
    let before = s.state().clone();

    assert_eq!(s.apply(ChatEvent::Ack(Ack { id: None })), ChatUpdate::Unchanged(EventKind::Ack));
    assert_eq!(
        s.apply(ChatEvent::Status(StatusNotice { message: Some("connected".to_owned()) })),
        ChatUpdate::Unchanged(EventKind::Status)
    );
    assert_eq!(s.state(), &before);
}

#[tokio::test(start_paused = true)]
async fn next_update_ends_when_source_closes() {
    let (mut s, tx) = session();
    drop(tx);
    assert_eq!(s.next_update().await, None);
}

// =============================================================
// Typing
// =============================================================

#[tokio::test(start_paused = true)]
async fn typing_sender_expires_after_window() {
    let (mut s, tx) = session();
    let started = Instant::now();

    tx.send(typing("Bob")).expect("open");
    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert_eq!(s.state().typing, ["Bob"]);

    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert!(s.state().typing.is_empty());
    assert!(started.elapsed() >= TYPING_WINDOW);
}

#[tokio::test(start_paused = true)]
async fn repeat_typing_does_not_extend_window() {
    let (mut s, tx) = session();
    let started = Instant::now();

    tx.send(typing("Bob")).expect("open");
    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    tx.send(typing("Bob")).expect("open");
    assert_eq!(next(&mut s).await, ChatUpdate::Unchanged(EventKind::Typing));
    assert_eq!(s.state().typing, ["Bob"]);

    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert!(s.state().typing.is_empty());
    assert!(started.elapsed() < TYPING_WINDOW + Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn typing_timers_are_independent_per_sender() {
    let (mut s, tx) = session();

    tx.send(typing("Bob")).expect("open");
    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);

    tokio::time::sleep(Duration::from_millis(500)).await;
    tx.send(typing("Ann")).expect("open");
    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert_eq!(s.typing_label().as_deref(), Some("Bob, Ann are typing…"));

    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert_eq!(s.state().typing, ["Ann"]);
    assert!(timeout(Duration::from_millis(400), s.next_update()).await.is_err());

    assert_eq!(next(&mut s).await, ChatUpdate::TypingChanged);
    assert!(s.state().typing.is_empty());
}

#[test]
fn typing_label_variants() {
    let (mut s, _tx) = session();
    assert_eq!(s.typing_label(), None);
    s.state.typing = vec!["Bob".to_owned()];
    assert_eq!(s.typing_label().as_deref(), Some("Bob is typing…"));
    s.state.typing.push("Ann".to_owned());
    assert_eq!(s.typing_label().as_deref(), Some("Bob, Ann are typing…"));
}

// =============================================================
// Sending
// =============================================================

#[tokio::test(start_paused = true)]
async fn send_while_not_ready_appends_local_copy() {
    let (client, _events) = ConnectionClient::new(&ClientConfig::default(), WsConnector);
    let (mut s, _tx) = session();
    let now = datetime!(2024-01-10 09:05:30 UTC);

    let outcome = s.send_message(&client, "You", "  paid rent  ", now);

    let expected = ChatMessage {
        id: "tmp-1704877530000".to_owned(),
        ..ChatMessage::outgoing("You", "paid rent", "09:05")
    };
    assert_eq!(outcome, SendOutcome::LocalOnly(expected.clone()));
    assert_eq!(s.state().messages, [expected]);
}

#[tokio::test(start_paused = true)]
async fn blank_message_is_ignored() {
    let (client, _events) = ConnectionClient::new(&ClientConfig::default(), WsConnector);
    let (mut s, _tx) = session();

    assert_eq!(s.send_message(&client, "You", "   ", datetime!(2024-01-10 09:05 UTC)), SendOutcome::Empty);
    assert!(s.state().messages.is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_signal_not_sent_when_idle() {
    let (client, _events) = ConnectionClient::new(&ClientConfig::default(), WsConnector);
    let (s, _tx) = session();
    assert!(!s.send_typing(&client, "You"));
}

#[test]
fn clock_time_is_zero_padded() {
    assert_eq!(clock_time(datetime!(2024-01-10 07:03 UTC)), "07:03");
    assert_eq!(clock_time(datetime!(2024-01-10 23:59:59 UTC)), "23:59");
}
