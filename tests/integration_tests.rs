//! End-to-end scenarios driven through a running orchestrator

use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;
use std::time::Duration;
use voxop::integration::{CancelReason, OrchestratorEvent};
use voxop::messages::Role;
use voxop::progress::{ManualClock, ManualScheduler};
use voxop::speech::{ProviderFrame, SpeechRequest};
use voxop::{
    ActionKind, OrchestratorBuilder, OrchestratorConfig, OrchestratorHandle, Payload,
    SpeechProvider, TaskResult,
};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct Harness {
    handle: OrchestratorHandle,
    scheduler: Arc<ManualScheduler>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_builder(OrchestratorBuilder::new())
    }

    fn with_builder(builder: OrchestratorBuilder) -> Self {
        let scheduler = Arc::new(ManualScheduler::new(Arc::new(ManualClock::new())));
        let (orchestrator, handle) = builder
            .with_manual_time(Arc::clone(&scheduler))
            .build()
            .unwrap();
        let threads = orchestrator.start().unwrap();
        Self {
            handle,
            scheduler,
            threads,
        }
    }

    fn advance_secs(&self, secs: u64) {
        self.scheduler.advance(Duration::from_secs(secs));
    }

    fn finish(self) {
        let all = self.handle.events().all.subscribe();
        self.handle.shutdown().unwrap();
        while !matches!(all.recv_timeout(WAIT).unwrap(), OrchestratorEvent::Shutdown) {}
        for t in self.threads {
            t.join().unwrap();
        }
    }
}

/// Provider whose streams always break off after one chunk
struct BrokenProvider;

impl SpeechProvider for BrokenProvider {
    fn synthesize(&self, _request: &SpeechRequest) -> voxop::Result<Receiver<ProviderFrame>> {
        let (tx, rx) = unbounded();
        tx.send(ProviderFrame::Audio(vec![0, 0, 1, 0])).unwrap();
        tx.send(ProviderFrame::Failed("upstream closed".into()))
            .unwrap();
        Ok(rx)
    }
}

#[test]
fn test_executed_login_scenario() {
    let harness = Harness::new();
    let responses = harness.handle.events().response.subscribe();

    let result = TaskResult::from_json(
        r#"{
            "success": true,
            "actionKind": "TestExecuted",
            "payload": {"file": "tests/login.spec.ts", "passed": true, "assertions": 6, "durationMs": 3500}
        }"#,
    )
    .unwrap();
    harness.handle.handle_result(result).unwrap();

    let text = responses.recv_timeout(WAIT).unwrap().text;
    assert!(text.contains("login"), "{}", text);
    assert!(text.contains("passed"), "{}", text);
    assert!(text.contains('6'), "{}", text);
    assert!(text.contains("3.5 seconds"), "{}", text);

    harness.finish();
}

#[test]
fn timeout_failure_is_normalized() {
    let harness = Harness::new();
    let responses = harness.handle.events().response.subscribe();

    harness
        .handle
        .handle_result(TaskResult::failed(
            ActionKind::TestExecuted,
            "TimeoutError: Waiting for selector '#submit' exceeded 30000ms\n    at Page.click (page.js:12:5)",
        ))
        .unwrap();

    let response = responses.recv_timeout(WAIT).unwrap();
    assert!(!response.success);
    assert!(response.text.contains("timeout"), "{}", response.text);
    assert!(!response.text.contains("TimeoutError"));
    assert!(!response.text.contains("30000ms"));
    assert!(!response.text.contains("Error:"));
    assert!(!response.text.contains("page.js"));

    harness.finish();
}

#[test]
fn every_kind_answers_with_its_fields() {
    let harness = Harness::new();
    let responses = harness.handle.events().response.subscribe();

    let results = vec![
        TaskResult::succeeded(
            ActionKind::TestCreated,
            Payload::new()
                .with("feature", "checkout")
                .with("file", "tests/checkout.spec.ts"),
        ),
        TaskResult::succeeded(
            ActionKind::TestExecuted,
            Payload::new()
                .with("file", "tests/search.spec.ts")
                .with("passed", true)
                .with("assertions", 4),
        ),
        TaskResult::succeeded(
            ActionKind::DefectFixed,
            Payload::new().with("file", "src/cart.ts"),
        ),
        TaskResult::succeeded(
            ActionKind::TestValidated,
            Payload::new().with("file", "tests/profile.spec.ts"),
        ),
        TaskResult::succeeded(
            ActionKind::StatusReport,
            Payload::new().with("total", 12).with("passed", 10).with("failed", 2),
        ),
        TaskResult::succeeded(
            ActionKind::PipelineRun,
            Payload::new().with("totalStages", 4).with("completedStages", 4),
        ),
    ];
    let expected = ["checkout", "search", "cart", "profile", "12", "4"];

    for result in results {
        harness.handle.handle_result(result).unwrap();
    }
    for needle in expected {
        let text = responses.recv_timeout(WAIT).unwrap().text;
        assert!(!text.is_empty());
        assert!(text.contains(needle), "{} missing from {}", needle, text);
    }

    assert_eq!(
        harness.handle.conversation().by_role(Role::Assistant).len(),
        6
    );
    harness.finish();
}

#[test]
fn short_operation_is_never_tracked() {
    let harness = Harness::new();
    let progress = harness.handle.events().progress.subscribe();
    let responses = harness.handle.events().response.subscribe();

    harness.handle.begin_long_operation("quick lint", 5000).unwrap();
    harness
        .handle
        .handle_result(TaskResult::succeeded(ActionKind::StatusReport, Payload::new()))
        .unwrap();
    // Commands are handled in order, so the begin has been processed
    responses.recv_timeout(WAIT).unwrap();

    harness.advance_secs(60);
    assert!(progress.recv_timeout(QUIET).is_err());
    assert_eq!(harness.scheduler.armed(), 0);

    harness.finish();
}

#[test]
fn cancel_mid_operation_silences_progress() {
    let harness = Harness::new();
    let progress = harness.handle.events().progress.subscribe();
    let cancelled = harness.handle.events().cancelled.subscribe();

    harness
        .handle
        .begin_long_operation("fixing the bug", 180_000)
        .unwrap();
    let start = progress.recv_timeout(WAIT).unwrap();
    assert_eq!(start.sequence, 0);
    assert!(start.spoken);
    assert!(start.message.contains("fixing the bug"));

    let mut spoken = 0;
    for expected_elapsed in [15_000, 30_000, 45_000] {
        harness.advance_secs(15);
        let update = progress.recv_timeout(WAIT).unwrap();
        assert_eq!(update.elapsed_ms, expected_elapsed);
        assert_eq!(update.expected_ms, 180_000);
        if update.spoken {
            spoken += 1;
        }
    }
    assert_eq!(spoken, 1);

    let status = harness.handle.status();
    assert!(status.active);
    assert_eq!(status.elapsed_ms, 45_000);

    harness.handle.handle_transcription("Cancel.").unwrap();
    let notice = cancelled.recv_timeout(WAIT).unwrap();
    assert_eq!(notice.operation, "fixing the bug");
    assert_eq!(notice.reason, CancelReason::UserRequest);
    assert_eq!(notice.elapsed_ms, 45_000);

    harness.advance_secs(120);
    assert!(progress.recv_timeout(QUIET).is_err());
    assert!(cancelled.recv_timeout(QUIET).is_err());
    assert!(!harness.handle.is_active());
    assert_eq!(harness.scheduler.armed(), 0);

    let acknowledgements = harness.handle.conversation().by_role(Role::Progress);
    assert!(acknowledgements
        .iter()
        .any(|e| e.text.contains("cancelled fixing the bug")));

    harness.finish();
}

#[test]
fn cancelling_twice_emits_one_notice() {
    let harness = Harness::new();
    let progress = harness.handle.events().progress.subscribe();
    let cancelled = harness.handle.events().cancelled.subscribe();
    let transcriptions = harness.handle.events().transcription.subscribe();

    harness
        .handle
        .begin_long_operation("running the regression suite", 120_000)
        .unwrap();
    progress.recv_timeout(WAIT).unwrap();

    harness.handle.cancel_operation().unwrap();
    harness.handle.handle_transcription("stop").unwrap();
    transcriptions.recv_timeout(WAIT).unwrap();

    assert_eq!(
        cancelled.recv_timeout(WAIT).unwrap().operation,
        "running the regression suite"
    );
    assert!(cancelled.recv_timeout(QUIET).is_err());

    harness.finish();
}

#[test]
fn full_run_speaks_at_most_every_thirty_seconds() {
    let harness = Harness::new();
    let progress = harness.handle.events().progress.subscribe();
    let responses = harness.handle.events().response.subscribe();

    harness
        .handle
        .begin_long_operation("running the pipeline", 120_000)
        .unwrap();
    progress.recv_timeout(WAIT).unwrap();

    let mut updates = Vec::new();
    for _ in 0..8 {
        harness.advance_secs(15);
        updates.push(progress.recv_timeout(WAIT).unwrap());
    }

    assert_eq!(updates.len(), 8);
    assert!(updates.iter().filter(|u| u.spoken).count() <= 4);
    assert!(updates.last().unwrap().message.contains("Almost done"));

    // The result closes the operation
    harness
        .handle
        .handle_result(TaskResult::succeeded(
            ActionKind::PipelineRun,
            Payload::new().with("totalStages", 3).with("completedStages", 3),
        ))
        .unwrap();
    responses.recv_timeout(WAIT).unwrap();

    harness.advance_secs(30);
    assert!(progress.recv_timeout(QUIET).is_err());

    harness.finish();
}

#[test]
fn speech_failure_keeps_text_response() {
    let harness =
        Harness::with_builder(OrchestratorBuilder::new().with_provider(Arc::new(BrokenProvider)));
    let responses = harness.handle.events().response.subscribe();
    let deltas = harness.handle.events().audio_delta.subscribe();
    let complete = harness.handle.events().audio_complete.subscribe();
    let failures = harness.handle.events().speech_failed.subscribe();

    harness
        .handle
        .handle_result(TaskResult::succeeded(
            ActionKind::TestValidated,
            Payload::new().with("file", "tests/login.spec.ts"),
        ))
        .unwrap();

    let response = responses.recv_timeout(WAIT).unwrap();
    assert!(response.text.contains("login"));

    let failure = failures.recv_timeout(WAIT).unwrap();
    assert_eq!(failure.request_id, response.request_id);
    assert_eq!(failure.error, "upstream closed");

    assert_eq!(deltas.recv_timeout(WAIT).unwrap().index, 0);
    assert!(complete.recv_timeout(QUIET).is_err());

    harness.finish();
}

#[test]
fn each_speak_gets_its_own_buffer() {
    let harness = Harness::new();
    let responses = harness.handle.events().response.subscribe();
    let deltas = harness.handle.events().audio_delta.subscribe();
    let complete = harness.handle.events().audio_complete.subscribe();

    harness
        .handle
        .handle_result(TaskResult::succeeded(ActionKind::Unknown, Payload::new()))
        .unwrap();
    harness
        .handle
        .handle_result(TaskResult::succeeded(
            ActionKind::StatusReport,
            Payload::new().with("total", 2).with("passed", 2),
        ))
        .unwrap();

    let first = responses.recv_timeout(WAIT).unwrap().request_id.unwrap();
    let second = responses.recv_timeout(WAIT).unwrap().request_id.unwrap();

    let a = complete.recv_timeout(WAIT).unwrap();
    let b = complete.recv_timeout(WAIT).unwrap();
    assert_eq!(a.request_id, first);
    assert_eq!(b.request_id, second);

    let chunks: Vec<_> = deltas.try_iter().collect();
    for audio in [&a, &b] {
        let streamed: Vec<u8> = chunks
            .iter()
            .filter(|c| c.request_id == audio.request_id)
            .flat_map(|c| c.data.clone())
            .collect();
        assert_eq!(streamed, audio.data);
    }
    assert_ne!(a.data, b.data);

    let wav = b.to_wav_bytes().unwrap();
    assert_eq!(&wav[..4], b"RIFF");

    harness.finish();
}

#[test]
fn config_file_settings_apply() {
    let config = OrchestratorConfig::from_toml_str(
        r#"
        cancel_keywords = ["enough"]

        [tracker]
        check_interval_ms = 10000
        speak_interval_ms = 20000
        "#,
    )
    .unwrap();
    let harness = Harness::with_builder(OrchestratorBuilder::new().with_config(config));
    let progress = harness.handle.events().progress.subscribe();
    let cancelled = harness.handle.events().cancelled.subscribe();
    let transcriptions = harness.handle.events().transcription.subscribe();

    harness.handle.begin_long_operation("building", 60_000).unwrap();
    progress.recv_timeout(WAIT).unwrap();

    harness.advance_secs(10);
    assert_eq!(progress.recv_timeout(WAIT).unwrap().elapsed_ms, 10_000);

    // "cancel" is no longer a keyword
    harness.handle.handle_transcription("cancel").unwrap();
    transcriptions.recv_timeout(WAIT).unwrap();
    assert!(cancelled.recv_timeout(QUIET).is_err());

    harness.handle.handle_transcription("OK, that's enough").unwrap();
    assert_eq!(cancelled.recv_timeout(WAIT).unwrap().operation, "building");

    harness.finish();
}
