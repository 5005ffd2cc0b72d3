mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client, config, settle, Collector, MockTransport, Reply};
use parking_lot::Mutex;
use pubnub::{ConnectionPurpose, Envelope, Error, ErrorKind, Targets, Timetoken};
use serde_json::{json, Value};

const ORIGIN: &str = "a.example";

fn cursors(transport: &MockTransport) -> Vec<String> {
    transport
        .sent("subscribe")
        .iter()
        .filter_map(|(_, url)| url.path_segments()?.last().map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_polls_and_dispatches() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[[],"100"]"#));
    transport.script("subscribe", Reply::ok(r#"[["hi","there"],"101"]"#));
    let client = client(config(), &transport);
    let messages = Collector::default();

    let started = client
        .subscribe()
        .channel("lobby")
        .callback(messages.callback())
        .start()
        .expect("valid subscribe");
    assert!(started);
    settle().await;

    assert_eq!(cursors(&transport), vec!["0", "100", "101"]);
    assert_eq!(
        client.multiplexer().cursor(ORIGIN),
        Some(Timetoken::new(101))
    );

    let received = messages.envelopes();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].channel(), Some("lobby"));
    assert_eq!(received[0].message(), Some(&json!("hi")));
    assert!(received[0].is_first() && !received[0].is_last());
    assert!(received[1].is_last());
    assert!(client.multiplexer().is_running(ORIGIN));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_path_and_query() {
    let transport = MockTransport::new();
    let mut config = config();
    config.heartbeat = Some(120);
    let client = client(config, &transport);

    client
        .subscribe()
        .channels(["a", "sports.*"])
        .channel_group("g")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;

    let sent = transport.sent("subscribe");
    let url = &sent[0].1;
    assert_eq!(url.path(), "/subscribe/sub-c/a,sports.*/0/0");
    assert_eq!(common::query(url, "channel-group").as_deref(), Some("g"));
    assert_eq!(common::query(url, "heartbeat").as_deref(), Some("120"));
}

#[tokio::test(start_paused = true)]
async fn test_async_subscribe_needs_callback() {
    let transport = MockTransport::new();
    let client = client(config(), &transport);

    assert!(matches!(
        client.subscribe().channel("lobby").start(),
        Err(Error::MissingCallback)
    ));
    assert!(matches!(
        client.subscribe().callback(|_| {}).start(),
        Err(Error::InvalidChannel(_))
    ));
    settle().await;
    assert!(transport.sent("subscribe").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_subscribe_keeps_first_callback() {
    let transport = MockTransport::new();
    let client = client(config(), &transport);
    let first = Collector::default();
    let second = Collector::default();

    assert!(client
        .subscribe()
        .channel("lobby")
        .callback(first.callback())
        .start()
        .expect("valid subscribe"));
    assert!(!client
        .subscribe()
        .channel("lobby")
        .callback(second.callback())
        .start()
        .expect("valid subscribe"));

    settle().await;
    transport.script("subscribe", Reply::ok(r#"[["m"],"5"]"#));
    // adding a new channel restarts the loop, which picks up the reply
    client
        .subscribe()
        .channel("other")
        .callback(second.callback())
        .start()
        .expect("valid subscribe");
    settle().await;

    let targets = client.multiplexer().targets(ORIGIN).expect("subscribed");
    assert_eq!(targets.channels, vec!["lobby", "other"]);
    assert_eq!(first.count(), 1);
    assert_eq!(second.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_shape_routing() {
    let transport = MockTransport::new();
    transport.script(
        "subscribe",
        Reply::ok(
            r#"[["m1","m2","m3","join"],"200","g,lobby,sports.*,sports.*","x,lobby,sports.golf,sports.golf-pnpres"]"#,
        ),
    );
    let client = client(config(), &transport);
    let group = Collector::default();
    let channel = Collector::default();
    let wildcard = Collector::default();
    let presence = Collector::default();

    client
        .subscribe()
        .channel_group("g")
        .callback(group.callback())
        .start()
        .expect("valid subscribe");
    client
        .subscribe()
        .channel("lobby")
        .callback(channel.callback())
        .start()
        .expect("valid subscribe");
    client
        .subscribe()
        .channel("sports.*")
        .callback(wildcard.callback())
        .presence_callback(presence.callback())
        .start()
        .expect("valid subscribe");
    settle().await;

    assert_eq!(group.count(), 1);
    assert_eq!(group.envelopes()[0].channel(), Some("x"));
    assert_eq!(channel.count(), 1);
    assert_eq!(wildcard.count(), 1);
    assert_eq!(wildcard.envelopes()[0].channel(), Some("sports.golf"));
    assert_eq!(presence.count(), 1);
    assert_eq!(presence.envelopes()[0].message(), Some(&json!("join")));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_does_not_stop_batch() {
    let transport = MockTransport::new();
    transport.script(
        "subscribe",
        Reply::ok(r#"[["boom","fine"],"300","a,b","a,b"]"#),
    );
    transport.script("subscribe", Reply::ok(r#"[["again"],"301","b","b"]"#));
    let client = client(config(), &transport);
    let survivor = Collector::default();

    client
        .subscribe()
        .channel("a")
        .callback(|_| panic!("callback failure"))
        .start()
        .expect("valid subscribe");
    client
        .subscribe()
        .channel("b")
        .callback(survivor.callback())
        .start()
        .expect("valid subscribe");
    settle().await;

    assert_eq!(survivor.count(), 2);
    assert!(client.multiplexer().is_running(ORIGIN));
}

#[tokio::test(start_paused = true)]
async fn test_cursor_never_moves_backwards() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[["x"],"200"]"#));
    transport.script("subscribe", Reply::ok(r#"[["y"],"150"]"#));
    let client = client(config(), &transport);

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;

    assert_eq!(
        client.multiplexer().cursor(ORIGIN),
        Some(Timetoken::new(200))
    );
    assert_eq!(cursors(&transport), vec!["0", "200", "200"]);
}

#[tokio::test(start_paused = true)]
async fn test_error_cycle_reports_and_keeps_cursor() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[[],"50"]"#));
    transport.script("subscribe", Reply::status(403, r#"{"error":"forbidden"}"#));
    let client = client(config(), &transport);
    let errors = Collector::default();

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .error_callback(errors.callback())
        .start()
        .expect("valid subscribe");
    settle().await;

    let reported = errors.envelopes();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].channel(), Some("lobby"));
    assert_eq!(
        reported[0].error().map(|e| e.kind()),
        Some(ErrorKind::NonSuccessStatus)
    );
    assert_eq!(
        client.multiplexer().cursor(ORIGIN),
        Some(Timetoken::new(50))
    );

    // the loop pauses before polling again
    assert_eq!(transport.sent("subscribe").len(), 2);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cursors(&transport), vec!["0", "50", "50"]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_stops_loop() {
    let transport = MockTransport::new();
    transport.set_down(ORIGIN, true);
    let client = client(config(), &transport);
    let errors = Collector::default();

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .error_callback(errors.callback())
        .start()
        .expect("valid subscribe");
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(transport.sent("subscribe").len(), 3);
    assert!(!client.multiplexer().is_running(ORIGIN));
    assert_eq!(errors.count(), 1);
    assert_eq!(
        errors.envelopes()[0].error().map(|e| e.kind()),
        Some(ErrorKind::Unknown)
    );
    // state survives so a restart can resume it
    assert!(client.multiplexer().targets(ORIGIN).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_last_target_tears_down() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[[],"70"]"#));
    let client = client(config(), &transport);

    client
        .subscribe()
        .channels(["a", "b"])
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;

    client
        .unsubscribe(Targets::default().channel("a"))
        .await
        .expect("unsubscribed");
    settle().await;
    let targets = client.multiplexer().targets(ORIGIN).expect("still subscribed");
    assert_eq!(targets.channels, vec!["b"]);
    assert!(client.multiplexer().is_running(ORIGIN));
    assert!(cursors(&transport).last().is_some_and(|c| c == "70"));

    let envelopes = client
        .unsubscribe(Targets::default().channel("b"))
        .await
        .expect("unsubscribed");
    settle().await;

    assert_eq!(envelopes.len(), 1);
    assert!(client.multiplexer().targets(ORIGIN).is_none());
    assert!(client.multiplexer().cursor(ORIGIN).is_none());
    assert!(!client.multiplexer().is_running(ORIGIN));
    assert!(transport
        .closed()
        .contains(&(ORIGIN.to_string(), ConnectionPurpose::Subscribe)));

    let leaves = transport.sent("leave");
    assert_eq!(leaves.len(), 2);
    assert_eq!(leaves[1].1.path(), "/v2/presence/sub-key/sub-c/channel/b/leave");
}

#[tokio::test(start_paused = true)]
async fn test_sync_subscribe_single_cycle() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[["one"],"900"]"#));
    transport.script("subscribe", Reply::ok(r#"[["two"],"800"]"#));
    let client = client(config(), &transport);
    let messages = Collector::default();

    let envelopes = client
        .subscribe()
        .channel("lobby")
        .callback(messages.callback())
        .execute()
        .await
        .expect("polled");

    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].message(), Some(&json!("one")));
    assert_eq!(messages.count(), 1);
    assert_eq!(
        client.multiplexer().sync_cursor(ORIGIN),
        Some(Timetoken::new(900))
    );
    assert!(client.multiplexer().targets(ORIGIN).is_none());

    client
        .subscribe()
        .channel("lobby")
        .execute()
        .await
        .expect("polled");
    assert_eq!(cursors(&transport), vec!["0", "900"]);
    assert_eq!(
        client.multiplexer().sync_cursor(ORIGIN),
        Some(Timetoken::new(900))
    );
}

#[tokio::test(start_paused = true)]
async fn test_presence_heartbeat_loop() {
    let transport = MockTransport::new();
    let mut config = config();
    config.heartbeat = Some(10);
    let client = client(config, &transport);

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");

    // interval is heartbeat / 2 - 1 = 4s
    tokio::time::sleep(Duration::from_millis(8_500)).await;
    assert_eq!(transport.sent("heartbeat").len(), 2);

    client
        .unsubscribe(Targets::default().channel("lobby"))
        .await
        .expect("unsubscribed");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.sent("heartbeat").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_clears_everything() {
    let transport = MockTransport::new();
    let client = client(config(), &transport);

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;
    assert!(client.multiplexer().is_running(ORIGIN));

    client.shutdown();
    settle().await;
    assert!(!client.multiplexer().is_running(ORIGIN));
    assert!(client.multiplexer().origins().is_empty());
}

/// Callback that logs when it starts and finishes, lingering on `slow`
fn traced(
    log: &Arc<Mutex<Vec<String>>>,
    slow: &'static str,
) -> impl Fn(&Envelope) + Send + Sync + 'static {
    let log = log.clone();
    move |envelope| {
        let message = envelope
            .message()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        log.lock().push(format!("start {}", message));
        if message == slow {
            std::thread::sleep(Duration::from_millis(300));
        }
        log.lock().push(format!("end {}", message));
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_waits_for_cycle_in_progress() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[["m1"],"20","a"]"#));
    transport.script("subscribe", Reply::ok(r#"[["m2"],"21","b"]"#));
    let client = client(config(), &transport);
    let log = Arc::new(Mutex::new(Vec::new()));

    client
        .subscribe()
        .channel("a")
        .callback(traced(&log, "m1"))
        .start()
        .expect("valid subscribe");
    wait_until(|| log.lock().iter().any(|entry| entry == "start m1")).await;

    // m1 is still being dispatched
    client
        .subscribe()
        .channel("b")
        .callback(traced(&log, "m1"))
        .start()
        .expect("valid subscribe");
    wait_until(|| log.lock().len() >= 4).await;

    assert_eq!(
        *log.lock(),
        vec!["start m1", "end m1", "start m2", "end m2"]
    );
    let sent = transport.sent("subscribe");
    assert_eq!(sent[0].1.path(), "/subscribe/sub-c/a/0/0");
    assert_eq!(sent[1].1.path(), "/subscribe/sub-c/a,b/0/20");
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_body_is_an_error_with_pause() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok("{}"));
    transport.script("subscribe", Reply::ok("[]"));
    let client = client(config(), &transport);
    let messages = Collector::default();
    let errors = Collector::default();

    client
        .subscribe()
        .channel("lobby")
        .callback(messages.callback())
        .error_callback(errors.callback())
        .start()
        .expect("valid subscribe");
    settle().await;

    assert_eq!(transport.sent("subscribe").len(), 1);
    assert_eq!(errors.count(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.sent("subscribe").len(), 2);
    assert_eq!(errors.count(), 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cursors(&transport), vec!["0", "0", "0"]);

    assert_eq!(messages.count(), 0);
    assert!(errors
        .envelopes()
        .iter()
        .all(|e| e.error().map(|e| e.kind()) == Some(ErrorKind::Unknown)));
    assert_eq!(client.multiplexer().cursor(ORIGIN), Some(Timetoken::ZERO));
}

#[test]
fn test_background_work_needs_runtime() {
    let transport = MockTransport::new();
    let client = client(config(), &transport);

    let started = client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .start();
    assert!(matches!(started, Err(Error::Config(_))));
    assert!(client.multiplexer().targets(ORIGIN).is_none());

    let spawned = client
        .publish("lobby", "hi")
        .expect("valid publish")
        .callback(|_| {})
        .spawn();
    assert!(matches!(spawned, Err(Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_sync_subscribe_announces_presence() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[["one"],"900"]"#));
    let mut config = config();
    config.heartbeat = Some(60);
    let client = client(config, &transport);

    client
        .subscribe()
        .channels(["lobby", "sports.*"])
        .channel_group("g")
        .execute()
        .await
        .expect("polled");

    assert_eq!(transport.endpoints(), vec!["heartbeat", "subscribe", "leave"]);
    let heartbeat = &transport.sent("heartbeat")[0].1;
    assert_eq!(common::query(heartbeat, "channel-group").as_deref(), Some("g"));
    let leave = &transport.sent("leave")[0].1;
    assert_eq!(
        leave.path(),
        "/v2/presence/sub-key/sub-c/channel/lobby,sports.*/leave"
    );
    assert!(common::query(leave, "channel-group").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sync_subscribe_keeps_live_channels() {
    let transport = MockTransport::new();
    let mut config = config();
    config.heartbeat = Some(60);
    let client = client(config, &transport);

    client
        .subscribe()
        .channel("lobby")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;

    transport.script("subscribe", Reply::ok(r#"[["one"],"900"]"#));
    client
        .subscribe()
        .channel("lobby")
        .execute()
        .await
        .expect("polled");

    assert_eq!(transport.sent("heartbeat").len(), 1);
    assert!(transport.sent("leave").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_forgets_sync_cursor() {
    let transport = MockTransport::new();
    transport.script("subscribe", Reply::ok(r#"[["one"],"900"]"#));
    let client = client(config(), &transport);

    client
        .subscribe()
        .channel("lobby")
        .execute()
        .await
        .expect("polled");
    assert_eq!(
        client.multiplexer().sync_cursor(ORIGIN),
        Some(Timetoken::new(900))
    );

    client
        .subscribe()
        .channel("other")
        .callback(|_| {})
        .start()
        .expect("valid subscribe");
    settle().await;
    client
        .unsubscribe(Targets::default().channel("other"))
        .await
        .expect("unsubscribed");

    assert!(client.multiplexer().sync_cursor(ORIGIN).is_none());
}
