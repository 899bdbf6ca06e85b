//! Demonstration of a PolyTouch tracking session.
//!
//! This example shows how to:
//! 1. Write a short synthetic recording of one paw circling the target
//! 2. Replay it through the collector into the tracker
//! 3. Run the continuous feedback protocol alongside
//! 4. Inspect the session channel, behavioral states and stats
//!
//! Run with: cargo run --example replay_demo

use std::io::Write;
use std::sync::Arc;

use polytouch::{
    audio::{AudioSink, RecordingSink},
    channel::{MemoryLog, SessionChannel},
    collector::{Collector, CollectorConfig, ReplaySource},
    config::SessionParams,
    feedback::{FeedbackController, FeedbackSettings},
    session::{run_tracking, SessionContext, Tracker, TrackerSettings},
    stats::SessionStats,
};

const PARAMS: &str = "1\n2\n2\n30\n256\n256\n5\n0.05\n0.8\n450\n0.05\n44100\n60\n";

fn main() -> anyhow::Result<()> {
    println!("PolyTouch - Replay Demo");
    println!("=======================");
    println!();

    let mut recording = tempfile::NamedTempFile::new()?;
    writeln!(
        recording,
        r#"{{"at_ms":0,"callback":"move","device_type":2,"pointer_id":3,"event_type":3,"x":456,"y":256}}"#
    )?;
    for step in 1..=60u64 {
        let angle = step as f64 * std::f64::consts::TAU / 60.0;
        let radius = 200.0 - step as f64 * 3.0;
        writeln!(
            recording,
            r#"{{"at_ms":{},"callback":"move","device_type":2,"pointer_id":3,"event_type":1,"x":{:.1},"y":{:.1}}}"#,
            step * 25,
            256.0 + radius * angle.cos(),
            256.0 + radius * angle.sin()
        )?;
    }
    writeln!(
        recording,
        r#"{{"at_ms":1550,"callback":"range_or_release","device_type":2,"pointer_id":3,"event_type":4}}"#
    )?;
    recording.flush()?;

    let params = SessionParams::parse(PARAMS)?;
    let ctx = SessionContext::new(params);
    let tracking = Arc::new(MemoryLog::new());
    let triggers = Arc::new(MemoryLog::new());
    let channel = SessionChannel::new(tracking.clone(), triggers.clone());
    let stats = Arc::new(SessionStats::new(ctx.key()));

    println!("Session {} ({}s)", ctx.key(), ctx.params().session_duration);
    println!();

    let sink = RecordingSink::new(-80.0);
    let factory = {
        let sink = sink.clone();
        move || Box::new(sink.clone()) as Box<dyn AudioSink>
    };
    let feedback = FeedbackController::new(
        ctx.clone(),
        channel.clone(),
        Arc::new(factory),
        stats.clone(),
        FeedbackSettings::default(),
    );
    println!("Protocol: {}", feedback.protocol());

    let runtime = tokio::runtime::Runtime::new()?;
    let feedback_handle = runtime.spawn(feedback.run());

    let mut collector = Collector::new(CollectorConfig {
        source: ReplaySource::File(recording.path().to_path_buf()),
        pace: true,
    });
    collector.start()?;

    let mut tracker = Tracker::new(ctx, channel, stats.clone(), TrackerSettings::default());
    let exit = run_tracking(&mut tracker, collector.receiver());
    collector.stop();
    let report = runtime.block_on(feedback_handle)?;

    println!("Tracking stopped: {exit:?}");
    println!("Feedback decisions: {}", report.decisions);
    println!();

    if let Some(last) = tracking.lines().last() {
        println!("Last tracking line: {last}");
    }
    println!("Trigger records: {}", triggers.len());
    println!("PCM bytes written: {}", sink.recording().bytes.len());
    println!();

    println!("Behavioral states:");
    for entry in tracker.state_log().entries() {
        println!("  {entry}");
    }
    println!();
    println!("{}", stats.summary());

    Ok(())
}
