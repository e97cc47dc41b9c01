use super::*;
use crate::decompression::NoOpDecompressor;
use crate::types::{DownloadRequest, TaskId};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use tempfile::TempDir;

const VALID_KEYS: &str = "titlekek_00 = 0123456789abcdef0123456789abcdef\n";

/// Decompressor double that writes the given output file names
struct FakeDecompressor {
    outputs: Vec<String>,
    delay: Duration,
    calls: Mutex<Vec<(PathBuf, PathBuf, bool)>>,
}

impl FakeDecompressor {
    fn writing(outputs: &[&str]) -> Self {
        Self {
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::writing(&[])
        }
    }
}

#[async_trait]
impl Decompressor for FakeDecompressor {
    async fn decompress(
        &self,
        source: &Path,
        output_dir: &Path,
        fix_padding: bool,
    ) -> crate::Result<()> {
        self.calls.lock().unwrap().push((
            source.to_path_buf(),
            output_dir.to_path_buf(),
            fix_padding,
        ));
        tokio::time::sleep(self.delay).await;
        for name in &self.outputs {
            std::fs::write(output_dir.join(name), b"nsp").unwrap();
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct Fixture {
    _temp: TempDir,
    dest: PathBuf,
    keys_dir: PathBuf,
    events: EventBus,
    seen: Arc<Mutex<Vec<(EventKind, String)>>>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("roms");
        let keys_dir = temp.path().join("switch");
        std::fs::create_dir_all(&dest).unwrap();

        let events = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        events.add_status_listener(move |_, kind, msg| {
            seen_clone.lock().unwrap().push((kind, msg.to_string()));
        });

        Self {
            _temp: temp,
            dest,
            keys_dir,
            events,
            seen,
        }
    }

    fn install_keys(&self) {
        std::fs::create_dir_all(&self.keys_dir).unwrap();
        std::fs::write(self.keys_dir.join("prod.keys"), VALID_KEYS).unwrap();
    }

    fn processor(&self, decompressor: Arc<dyn Decompressor>) -> PostProcessor {
        self.processor_with(ProcessingConfig::default(), Duration::from_secs(5), decompressor)
    }

    fn processor_with(
        &self,
        config: ProcessingConfig,
        timeout: Duration,
        decompressor: Arc<dyn Decompressor>,
    ) -> PostProcessor {
        let tools = ToolsConfig {
            keys_dir: self.keys_dir.clone(),
            decompress_timeout: timeout,
            ..Default::default()
        };
        let key_store = Arc::new(KeyStore::new(self.keys_dir.clone(), None));
        PostProcessor::new(self.events.clone(), config, &tools, key_store, decompressor)
    }

    fn task(&self, filename: &str) -> Task {
        let mut task = Task::new(
            TaskId(1),
            DownloadRequest::new("http://host/x", filename, self.dest.clone()),
        );
        task.status = crate::types::Status::Completed;
        task
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.seen.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

#[tokio::test]
async fn zip_is_extracted_and_removed() {
    let fx = Fixture::new();
    let task = fx.task("Game (USA).zip");
    write_zip(&task.output_path(), &[("Game (USA).sfc", b"rom")]);

    let outcome = fx.processor(Arc::new(NoOpDecompressor)).process(&task).await;

    assert_eq!(
        outcome,
        PostProcessOutcome::Extracted {
            files: vec![fx.dest.join("Game (USA).sfc")]
        }
    );
    assert!(!task.output_path().exists());
    assert_eq!(std::fs::read(fx.dest.join("Game (USA).sfc")).unwrap(), b"rom");
    assert_eq!(
        fx.seen.lock().unwrap().as_slice(),
        &[(EventKind::Extracted, "Extracted ZIP: Game (USA).zip".to_string())]
    );
}

#[tokio::test]
async fn corrupt_zip_reports_extract_failed_and_keeps_file() {
    let fx = Fixture::new();
    let task = fx.task("broken.ZIP");
    std::fs::write(task.output_path(), b"definitely not a zip").unwrap();

    let outcome = fx.processor(Arc::new(NoOpDecompressor)).process(&task).await;

    let message = outcome.error_message().unwrap();
    assert!(message.starts_with("ZIP extraction failed:"));
    assert!(task.output_path().exists());
    assert_eq!(fx.kinds(), vec![EventKind::ExtractFailed]);
}

#[tokio::test]
async fn plain_files_are_left_alone() {
    let fx = Fixture::new();
    let task = fx.task("game.nsp");
    std::fs::write(task.output_path(), b"data").unwrap();

    let outcome = fx.processor(Arc::new(NoOpDecompressor)).process(&task).await;

    assert_eq!(outcome, PostProcessOutcome::Skipped);
    assert!(task.output_path().exists());
    assert!(fx.kinds().is_empty());
}

#[tokio::test]
async fn disabled_extraction_skips_archives() {
    let fx = Fixture::new();
    let task = fx.task("game.zip");
    write_zip(&task.output_path(), &[("a", b"b")]);
    let config = ProcessingConfig {
        extract_archives: false,
        ..Default::default()
    };

    let outcome = fx
        .processor_with(config, Duration::from_secs(5), Arc::new(NoOpDecompressor))
        .process(&task)
        .await;

    assert_eq!(outcome, PostProcessOutcome::Skipped);
    assert!(task.output_path().exists());
}

#[tokio::test]
async fn missing_keys_fail_decompression_with_actionable_message() {
    let fx = Fixture::new();
    let task = fx.task("Title [0100].nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();
    let fake = Arc::new(FakeDecompressor::writing(&["Title [0100].nsp"]));

    let outcome = fx.processor(fake.clone()).process(&task).await;

    let message = outcome.error_message().unwrap();
    assert!(message.starts_with("NSZ decompression failed:"));
    assert!(message.contains("keys not found"));
    assert!(fake.calls.lock().unwrap().is_empty());
    assert!(task.output_path().exists());
    assert_eq!(
        fx.kinds(),
        vec![EventKind::Decompressing, EventKind::DecompressFailed]
    );
}

#[tokio::test]
async fn expected_container_is_reported_and_source_kept() {
    let fx = Fixture::new();
    fx.install_keys();
    let task = fx.task("Title [0100].nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();
    let fake = Arc::new(FakeDecompressor::writing(&["Title [0100].nsp"]));

    let outcome = fx.processor(fake.clone()).process(&task).await;

    let expected = fx.dest.join("Title [0100].nsp");
    assert_eq!(
        outcome,
        PostProcessOutcome::Decompressed {
            message: format!("Successfully decompressed to {}", expected.display())
        }
    );
    assert!(task.output_path().exists());

    let calls = fake.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (task.output_path(), fx.dest.clone(), false));

    let seen = fx.seen.lock().unwrap();
    assert_eq!(seen[0].1, "Decompressing NSZ: Title [0100].nsz");
    assert_eq!(seen[1].0, EventKind::Decompressed);
    assert!(seen[1].1.starts_with("Decompressed NSZ: Successfully decompressed to"));
}

#[tokio::test]
async fn newly_created_containers_are_reported_when_name_differs() {
    let fx = Fixture::new();
    fx.install_keys();
    std::fs::write(fx.dest.join("older.nsp"), b"pre-existing").unwrap();
    let task = fx.task("title.nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();
    let fake = Arc::new(FakeDecompressor::writing(&["b-update.nsp", "a-base.nsp"]));

    let outcome = fx.processor(fake).process(&task).await;

    assert_eq!(
        outcome,
        PostProcessOutcome::Decompressed {
            message: "Successfully decompressed. Created: a-base.nsp, b-update.nsp".to_string()
        }
    );
}

#[tokio::test]
async fn no_output_is_a_decompression_failure() {
    let fx = Fixture::new();
    fx.install_keys();
    let task = fx.task("title.nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();

    let outcome = fx
        .processor(Arc::new(FakeDecompressor::writing(&[])))
        .process(&task)
        .await;

    assert!(
        outcome
            .error_message()
            .unwrap()
            .contains("no NSP files found")
    );
}

#[tokio::test]
async fn slow_decompressor_times_out() {
    let fx = Fixture::new();
    fx.install_keys();
    let task = fx.task("title.nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();

    let outcome = fx
        .processor_with(
            ProcessingConfig::default(),
            Duration::from_millis(50),
            Arc::new(FakeDecompressor::slow(Duration::from_secs(10))),
        )
        .process(&task)
        .await;

    assert!(outcome.error_message().unwrap().contains("timed out"));
    assert_eq!(
        fx.kinds(),
        vec![EventKind::Decompressing, EventKind::DecompressFailed]
    );
}

#[tokio::test]
async fn unavailable_tool_is_reported_as_failure() {
    let fx = Fixture::new();
    fx.install_keys();
    let task = fx.task("title.nsz");
    std::fs::write(task.output_path(), b"nsz").unwrap();

    let outcome = fx.processor(Arc::new(NoOpDecompressor)).process(&task).await;

    assert!(outcome.error_message().unwrap().contains("nsz"));
}

#[test]
fn decompression_status_combines_tool_and_keys() {
    let fx = Fixture::new();
    let processor = fx.processor(Arc::new(FakeDecompressor::writing(&[])));
    let status = processor.decompression_status();
    assert_eq!(status.tool, "fake");
    assert!(status.tool_available);
    assert!(!status.ready);

    fx.install_keys();
    let processor = fx.processor(Arc::new(FakeDecompressor::writing(&[])));
    let status = processor.decompression_status();
    assert!(status.ready);
    assert_eq!(status.keys_path, Some(fx.keys_dir.join("prod.keys")));
}
