//! 停止与失败路径: 任何退出方式都会释放视频源
mod common;

use std::thread;
use std::time::Duration;

use common::{context, frame_with_people, Watch, ScriptedSource};
use crowd_sentinel::pipeline::{
    SessionOptions, SessionState, StopSignal, StreamEvent, StreamingSession, MAX_CONSECUTIVE_FAILURES,
};

fn paced() -> SessionOptions {
    SessionOptions {
        pacing: Some(Duration::from_millis(2)),
        ..Default::default()
    }
}

#[test]
fn test_stop_signal_ends_endless_camera() {
    let ctx = context();
    let watch = Watch::default();
    let stop = StopSignal::new();
    let (tx, rx) = crossbeam_channel::bounded::<StreamEvent>(1);

    let (state, summary) = thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut tx = tx;
            let mut session = StreamingSession::new(&ctx, paced(), stop.clone());
            let frames = vec![frame_with_people(1)];
            let result = session.run_with(
                || Ok(ScriptedSource::endless_camera(frames, &watch).into_handle()),
                &mut tx,
            );
            (session.state(), result)
        });

        for _ in 0..3 {
            rx.recv().unwrap();
        }
        stop.stop();
        // 持续接收, 避免会话阻塞在发送上
        for _ in rx.iter() {}
        worker.join().unwrap()
    });

    let summary = summary.unwrap();
    assert_eq!(state, SessionState::Closed);
    assert!(summary.frames >= 3);
    assert!(watch.is_closed());
}

#[test]
fn test_stop_streams_cancels_running_session() {
    let ctx = context();
    let watch = Watch::default();
    let (tx, rx) = crossbeam_channel::bounded::<StreamEvent>(1);

    let state = thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut tx = tx;
            let mut session = StreamingSession::new(&ctx, paced(), StopSignal::new());
            let frames = vec![frame_with_people(2)];
            session
                .run_with(
                    || Ok(ScriptedSource::endless_camera(frames, &watch).into_handle()),
                    &mut tx,
                )
                .unwrap();
            session.state()
        });

        rx.recv().unwrap();
        ctx.stop_streams();
        for _ in rx.iter() {}
        worker.join().unwrap()
    });

    assert_eq!(state, SessionState::Closed);
    assert!(watch.is_closed());
}

#[test]
fn test_disconnected_consumer_drains_session() {
    let ctx = context();
    let watch = Watch::default();
    let (tx, rx) = crossbeam_channel::bounded::<StreamEvent>(1);

    let history = thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut tx = tx;
            let mut session = StreamingSession::new(&ctx, paced(), StopSignal::new());
            let frames = vec![frame_with_people(1)];
            session
                .run_with(
                    || Ok(ScriptedSource::endless_camera(frames, &watch).into_handle()),
                    &mut tx,
                )
                .unwrap();
            session.history().to_vec()
        });

        rx.recv().unwrap();
        drop(rx);
        worker.join().unwrap()
    });

    assert_eq!(history.last(), Some(&SessionState::Closed));
    assert!(history.contains(&SessionState::Draining));
    assert!(watch.is_closed());
}

#[test]
fn test_slow_consumer_holds_the_loop() {
    let ctx = context();
    let watch = Watch::default();
    let (tx, rx) = crossbeam_channel::bounded::<StreamEvent>(1);

    thread::scope(|s| {
        s.spawn(|| {
            let mut tx = tx;
            let options = SessionOptions {
                pacing: None,
                ..Default::default()
            };
            let mut session = StreamingSession::new(&ctx, options, StopSignal::new());
            let frames = vec![frame_with_people(1)];
            let _ = session.run_with(
                || Ok(ScriptedSource::endless_camera(frames, &watch).into_handle()),
                &mut tx,
            );
        });

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(100));
        // 通道容量为1: 消费端不读时, 会话最多再读两帧 (一帧在通道中, 一帧等待发送)
        assert!(watch.reads() <= 3, "reads = {}", watch.reads());
        drop(rx);
    });
    assert!(watch.is_closed());
}

#[test]
fn test_single_bad_frame_is_skipped_in_band() {
    let ctx = context();
    let watch = Watch::default();
    let mut session = StreamingSession::new(
        &ctx,
        SessionOptions {
            looping: false,
            ..Default::default()
        },
        StopSignal::new(),
    );
    let mut events = Vec::new();
    let frames = vec![frame_with_people(1); 4];
    let summary = session
        .run_with(
            || Ok(ScriptedSource::file(frames, &watch).unreadable_at([1]).into_handle()),
            &mut events,
        )
        .unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(events.len(), 4);
    assert!(events[1].is_error());
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_consecutive_failures_fail_the_session() {
    let ctx = context();
    let watch = Watch::default();
    let mut session = StreamingSession::new(&ctx, SessionOptions::default(), StopSignal::new());
    let mut events = Vec::new();
    let frames = vec![frame_with_people(1)];
    let bad = 2..2 + MAX_CONSECUTIVE_FAILURES as u64;
    let err = session
        .run_with(
            || Ok(ScriptedSource::endless_camera(frames, &watch).unreadable_at(bad).into_handle()),
            &mut events,
        )
        .unwrap_err();

    assert_eq!(err.cause_tag(), "source_unavailable");
    assert_eq!(session.state(), SessionState::Failed);
    assert!(watch.is_closed());
    // 两帧正常 + 四个流内错误 + 最终错误
    let errors = events.iter().filter(|e| e.is_error()).count();
    assert_eq!(events.len() - errors, 2);
    assert_eq!(errors, MAX_CONSECUTIVE_FAILURES as usize);
}
