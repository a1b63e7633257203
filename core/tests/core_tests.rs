/// Service integration tests
/// Ingest task, bridge transports, demo generator and query API

extern crate chatflow_core;

use chatflow_core::api::serve_api;
use chatflow_core::bridge::{run_udp_bridge, BridgeEvent};
use chatflow_core::demo::DemoGenerator;
use chatflow_core::service::load_buffered_into;
use chatflow_core::{
    Config, FlowHandle, FlowService, Message, MessageType, Snapshot, StreamStatus,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

/// Wait until a published snapshot satisfies `cond`
async fn wait_for<F>(handle: &FlowHandle, cond: F) -> Arc<Snapshot>
where
    F: FnMut(&Arc<Snapshot>) -> bool,
{
    let mut rx = handle.subscribe();
    let snapshot = timeout(Duration::from_secs(5), rx.wait_for(cond))
        .await
        .expect("timed out waiting for snapshot")
        .expect("ingest task stopped");
    snapshot.clone()
}

fn msg(author: &str, text: &str, kind: &str, ts: i64) -> Message {
    Message::new(author, text, MessageType::from(kind)).with_timestamp(ts)
}

#[tokio::test]
async fn test_push_builds_threads() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    handle.push(msg("Alex", "hello", "direct", 100)).unwrap();
    handle.push(msg("Sam", "@Alex hi", "thread", 200)).unwrap();
    handle.push(msg("Bot", "buy now", "spam", 300)).unwrap();

    let snapshot = wait_for(&handle, |s| s.board.total_count() == 3).await;
    let board = &snapshot.board;

    assert_eq!(board.thread("direct-Alex").unwrap().participants, vec!["Alex"]);
    assert_eq!(board.thread("thread-Alex").unwrap().participants, vec!["Sam"]);
    assert_eq!(board.spam_count(), 1);
    assert_eq!(board.thread_count(), 2);
    assert_eq!(snapshot.status, StreamStatus::waiting());
}

#[tokio::test]
async fn test_log_capacity_from_config() {
    let config = Config {
        log_capacity: 10,
        ..Default::default()
    };
    let (handle, _task) = FlowService::spawn(&config);

    for i in 0..25 {
        handle
            .push(msg("Alex", &i.to_string(), "direct", i).with_id(i.to_string()))
            .unwrap();
    }

    let snapshot = wait_for(&handle, |s| {
        s.board.messages().last().map_or(false, |m| m.id == "24")
    })
    .await;
    let ids: Vec<&str> = snapshot.board.messages().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, (15..25).map(|i| i.to_string()).collect::<Vec<_>>());
    assert_eq!(snapshot.board.thread("direct-Alex").unwrap().messages.len(), 10);
}

#[tokio::test]
async fn test_batch_event_skips_invalid_messages() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let event = BridgeEvent::parse(
        r#"{"type":"CHATFLOW_MESSAGES","messages":[
            {"author":"Alex","text":"hi","type":"direct","timestamp":1},
            {"text":"no author"},
            {"author":"Casey","text":"@Riley welcome!","type":"thread","timestamp":2}
        ]}"#,
    )
    .unwrap();

    assert_eq!(handle.push_event(event).unwrap(), 2);
    let snapshot = wait_for(&handle, |s| s.board.total_count() == 2).await;
    assert!(snapshot.board.thread("thread-Riley").is_some());
}

#[tokio::test]
async fn test_badly_typed_records_do_not_sink_the_batch() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let event = BridgeEvent::parse(
        r#"{"type":"CHATFLOW_MESSAGES","messages":[
            {"author":"Alex","text":"hi","type":"direct","timestamp":1},
            {"author":42},
            {"author":"Sam","text":"@Alex yo","type":"thread","timestamp":"2"},
            "not a record"
        ]}"#,
    )
    .unwrap();

    assert_eq!(handle.push_event(event).unwrap(), 3);
    let snapshot = wait_for(&handle, |s| s.board.total_count() == 3).await;
    assert!(snapshot.board.thread("direct-42").is_some());
    assert_eq!(snapshot.board.thread("thread-Alex").unwrap().last_activity, 2);
}

#[tokio::test]
async fn test_buffered_file_with_bad_timestamp_still_loads() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"chatflowMessages":[
            {{"author":"Alex","text":"hello","type":"direct","timestamp":"now"}},
            {{"author":"Riley","text":"hey","type":"direct","timestamp":50}}
        ]}}"#
    )
    .unwrap();

    assert_eq!(load_buffered_into(&handle, file.path()).await.unwrap(), 2);
    let snapshot = wait_for(&handle, |s| s.board.total_count() == 2).await;
    assert_eq!(snapshot.status, StreamStatus::extension());
    assert!(snapshot.board.thread("direct-Alex").unwrap().last_activity > 50);
}

#[tokio::test]
async fn test_buffered_load_switches_status() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"chatflowMessages":[
            {{"id":"a","author":"Alex","text":"hello","type":"direct","timestamp":100}},
            {{"id":"b","author":"Bot","text":"CHECK OUT MY CHANNEL","type":"spam","timestamp":101}}
        ]}}"#
    )
    .unwrap();

    let loaded = load_buffered_into(&handle, file.path()).await.unwrap();
    assert_eq!(loaded, 2);

    let snapshot = wait_for(&handle, |s| s.board.total_count() == 2).await;
    assert_eq!(snapshot.status, StreamStatus::extension());
    assert_eq!(snapshot.board.spam_count(), 1);
}

#[tokio::test]
async fn test_empty_buffer_keeps_status() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"chatflowMessages":[]}}"#).unwrap();

    assert_eq!(load_buffered_into(&handle, file.path()).await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.snapshot().status, StreamStatus::waiting());
}

#[tokio::test]
async fn test_demo_runs_until_stopped() {
    let config = Config {
        demo_min_interval: Duration::from_millis(5),
        demo_jitter: Duration::from_millis(5),
        seed: Some(7),
        ..Default::default()
    };
    let (handle, _task) = FlowService::spawn(&config);

    let demo = DemoGenerator::from_config(&config).start(handle.clone()).unwrap();
    assert!(demo.is_running());

    let snapshot = wait_for(&handle, |s| s.board.total_count() >= 5).await;
    assert_eq!(snapshot.status, StreamStatus::demo());

    demo.stop().await;
    wait_for(&handle, |s| s.status == StreamStatus::waiting()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_stop = handle.snapshot().board.total_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().board.total_count(), after_stop);
}

#[tokio::test]
async fn test_demo_stop_restores_extension_status() {
    let config = Config {
        demo_min_interval: Duration::from_millis(5),
        demo_jitter: Duration::from_millis(5),
        seed: Some(3),
        ..Default::default()
    };
    let (handle, _task) = FlowService::spawn(&config);
    handle.set_status(StreamStatus::extension()).unwrap();
    wait_for(&handle, |s| s.status == StreamStatus::extension()).await;

    let demo = DemoGenerator::from_config(&config).start(handle.clone()).unwrap();
    wait_for(&handle, |s| s.status == StreamStatus::demo()).await;

    // Cancelling without awaiting still puts the banner back
    demo.cancel();
    let snapshot = wait_for(&handle, |s| s.status == StreamStatus::extension()).await;
    assert!(snapshot.board.total_count() >= 1);
}

#[tokio::test]
async fn test_udp_bridge_delivers_events() {
    let (handle, _task) = FlowService::spawn(&Config::default());

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(run_udp_bridge(socket, handle.clone()));

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"garbage", addr).await.unwrap();
    let event = br#"{"type":"CHATFLOW_MESSAGE","message":
        {"author":"Sam","text":"@Alex hi","type":"thread","timestamp":200}}"#;
    sender.send_to(event, addr).await.unwrap();

    let snapshot = wait_for(&handle, |s| s.board.total_count() == 1).await;
    let thread = snapshot.board.thread("thread-Alex").unwrap();
    assert_eq!(thread.last_activity, 200);
}

async fn api_call(
    stream: &mut BufReader<TcpStream>,
    request: serde_json::Value,
) -> serde_json::Value {
    stream
        .get_mut()
        .write_all(format!("{}\n", request).as_bytes())
        .await
        .unwrap();
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_api_queries() {
    let (handle, _task) = FlowService::spawn(&Config::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_api(listener, handle.clone(), 20));

    let mut stream = BufReader::new(TcpStream::connect(addr).await.unwrap());

    let pushed = api_call(
        &mut stream,
        serde_json::json!({
            "command": "push",
            "message": {"author": "Alex", "text": "hello", "type": "direct", "timestamp": 100}
        }),
    )
    .await;
    assert_eq!(pushed["success"], true);
    assert!(pushed["data"]["message_id"].is_string());

    handle.push(msg("Sam", "@Alex hi", "thread", 200)).unwrap();
    wait_for(&handle, |s| s.board.total_count() == 2).await;

    let stats = api_call(&mut stream, serde_json::json!({"command": "stats"})).await;
    assert_eq!(stats["data"]["total"], 2);
    assert_eq!(stats["data"]["threads"], 2);
    assert_eq!(stats["data"]["direct"], 1);
    assert_eq!(stats["data"]["spam"], 0);

    let threads = api_call(&mut stream, serde_json::json!({"command": "threads"})).await;
    assert_eq!(threads["data"]["threads"][0]["id"], "thread-Alex");
    assert_eq!(threads["data"]["threads"][1]["participants"], "@Alex");

    let feed = api_call(&mut stream, serde_json::json!({"command": "feed", "limit": 1})).await;
    assert_eq!(feed["data"]["feed"].as_array().unwrap().len(), 1);
    assert_eq!(feed["data"]["feed"][0]["author"], "Sam");

    let room = api_call(
        &mut stream,
        serde_json::json!({"command": "room", "thread_id": "thread-Alex"}),
    )
    .await;
    assert_eq!(room["data"]["title"], "Conversation: @Sam");

    let missing = api_call(
        &mut stream,
        serde_json::json!({"command": "room", "thread_id": "direct-Nobody"}),
    )
    .await;
    assert_eq!(missing["success"], false);

    let bad = api_call(&mut stream, serde_json::json!({"command": "launch"})).await;
    assert_eq!(bad["success"], false);

    let status = api_call(&mut stream, serde_json::json!({"command": "status"})).await;
    assert_eq!(status["data"]["connection_text"], "Waiting for messages");
}
