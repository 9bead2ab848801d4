mod common;
use common::{ChannelBehavior, ExecScript, FakeChannel, Journal};

use hostbridge::managers::session::Session;
use hostbridge::managers::stream::{BufferSink, CancelFlag, StreamMultiplexer};
use hostbridge::services::logger::Logger;
use std::time::Duration;

fn session_with(script: ExecScript) -> (Session, Journal) {
    let journal = Journal::default();
    let behavior = ChannelBehavior::default().respond(move |_| script.clone());
    let channel = FakeChannel::new(journal.clone(), behavior);
    (Session::new(&Logger::new("test"), Box::new(channel)), journal)
}

fn multiplexer(chunk_size: usize) -> StreamMultiplexer {
    StreamMultiplexer::new(CancelFlag::new())
        .with_chunk_size(chunk_size)
        .with_idle_sleep(Duration::from_millis(1))
}

#[test]
fn lines_survive_chunks_smaller_than_a_line() {
    let lines: Vec<String> = (1..=20).map(|n| format!("step {:02} done\n", n)).collect();
    let mut script = ExecScript::exit(0);
    for line in &lines {
        script = script.stdout(line.as_bytes()).pending();
    }

    for chunk_size in [1, 3, 7, 512] {
        let (mut session, _) = session_with(script.clone());
        let mut sink = BufferSink::default();
        let code = session
            .stream("deploy.sh", &multiplexer(chunk_size), &mut sink)
            .expect("stream");
        assert_eq!(code, 0);
        assert_eq!(
            String::from_utf8(sink.stdout).unwrap(),
            lines.concat(),
            "chunk size {}",
            chunk_size
        );
    }
}

#[test]
fn final_chunk_written_at_exit_is_drained() {
    let script = ExecScript::exit(4)
        .stdout(b"working\n")
        .pending()
        .stdout(b"final words\n")
        .linger(2)
        .stderr(b"warning: low disk\n");
    let (mut session, _) = session_with(script);
    let mut sink = BufferSink::default();
    let code = session
        .stream("job", &multiplexer(1024), &mut sink)
        .expect("stream");
    assert_eq!(code, 4);
    assert_eq!(sink.stdout, b"working\nfinal words\n".to_vec());
    assert_eq!(sink.stderr, b"warning: low disk\n".to_vec());
}

#[test]
fn cancelled_stream_still_lets_the_session_close() {
    let script = ExecScript::exit(0).pending().pending().pending();
    let (mut session, journal) = session_with(script);
    let cancel = CancelFlag::new();
    cancel.cancel();
    let multiplexer = StreamMultiplexer::new(cancel).with_idle_sleep(Duration::from_millis(1));
    let err = session
        .stream("tail -f /var/log/syslog", &multiplexer, &mut BufferSink::default())
        .expect_err("cancelled");
    assert_eq!(err.code(), "CANCELLED");
    session.close();
    assert_eq!(journal.count(|call| *call == common::Call::Close), 1);
}

#[test]
fn buffered_run_collects_both_channels() {
    let script = ExecScript::exit(1).stdout(b"out\n").stderr(b"err\n");
    let (mut session, _) = session_with(script);
    let output = session.run("false").expect("run");
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert!(!output.success());
}

#[test]
fn silent_connection_drop_ends_the_stream() {
    let mut script = ExecScript::exit(0).stdout(b"started\n");
    for _ in 0..50 {
        script = script.pending();
    }
    let (mut session, _) = session_with(script.drop_connection_after(3));
    let mut sink = BufferSink::default();
    let err = session
        .stream("tail -f /var/log/syslog", &multiplexer(512), &mut sink)
        .expect_err("connection dropped");
    assert_eq!(err.code(), "CHANNEL_ERROR");
    assert_eq!(sink.stdout, b"started\n".to_vec());
}
