use archive_pipeline::{
    BatchConfig, BatchRunner, Comment, FileTask, FsSourceResolver, OpenedSource, OutputLayout,
    PipelineError, ResolvedFile, ScoreReporter, SizeBuckets, SourceForm, SourceResolver,
    StripNewlines, SIZE_BUCKETS,
};
use bzip2::write::BzEncoder;
use bzip2::Compression;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn record_lines(count: usize, malformed: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        if i < malformed {
            out.push_str("{\"body\": broken\n");
        } else {
            out.push_str(&format!(
                "{{\"author\":\"user{i}\",\"body\":\"{}\",\"score\":{i}}}\n",
                "x".repeat(i % 120)
            ));
        }
    }
    out
}

fn write_plain(root: &Path, task: &FileTask, contents: &str) {
    let path = root.join(task.relative());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn write_bz2(root: &Path, task: &FileTask, contents: &str) {
    let path = root.join(format!("{}.bz2", task.relative()));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut encoder = BzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mixed_batch_reports_totals_and_skips_missing_file() {
    let temp = TempDir::new().expect("tempdir");
    let unzipped = temp.path().join("unzipped");
    let zipped = temp.path().join("zipped");

    let tasks = vec![
        FileTask::for_month(2008, 1),
        FileTask::for_month(2008, 2),
        FileTask::for_month(2008, 3),
        FileTask::for_month(2008, 4),
    ];
    write_plain(&unzipped, &tasks[0], &record_lines(100, 2));
    write_bz2(&zipped, &tasks[1], &record_lines(50, 2));
    write_plain(&unzipped, &tasks[2], "");
    // tasks[3] exists nowhere.

    let resolver = FsSourceResolver::new(Some(unzipped), Some(zipped));
    let summary = BatchRunner::new(BatchConfig::new(2), Arc::new(resolver), Arc::new(SizeBuckets))
        .run(tasks)
        .await
        .expect("batch");

    assert_eq!(summary.total("Total"), Some(150));
    assert_eq!(summary.total("Errors"), Some(4));
    assert_eq!(summary.files_processed, 3);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.pool.issued, 4);
    assert_eq!(summary.pool.returned, 4);
    assert_eq!(summary.pool.in_flight, 0);

    let bucketed: i64 = SIZE_BUCKETS
        .iter()
        .map(|bucket| summary.total(bucket).unwrap_or(0))
        .sum();
    assert_eq!(bucketed, 150 - 4, "malformed lines must not be bucketed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn strip_pipeline_round_trips_bodies() {
    let temp = TempDir::new().expect("tempdir");
    let unzipped = temp.path().join("unzipped");
    let out = temp.path().join("out");
    let task = FileTask::for_month(2011, 8);

    let body = "multi\nline\r\nbody with \"quotes\" and ünïcode";
    let line = serde_json::to_string(&Comment {
        author: "a".into(),
        body: body.into(),
    })
    .unwrap();
    write_plain(&unzipped, &task, &format!("{line}\n{{\"body\":\"second\"}}\n"));

    let summary = BatchRunner::new(
        BatchConfig::new(1),
        Arc::new(FsSourceResolver::new(Some(unzipped), None)),
        Arc::new(StripNewlines),
    )
    .with_output(OutputLayout::new(&out))
    .run(vec![task])
    .await
    .expect("batch");

    let written = fs::read_to_string(out.join("2011/RC_2011-08")).expect("output file");
    let lines: Vec<_> = written.lines().collect();
    assert_eq!(
        lines,
        vec!["multilinebody with \"quotes\" and ünïcode", "second"]
    );
    assert_eq!(summary.total("Written"), Some(2));
}

#[tokio::test]
async fn output_pipeline_without_output_root_fails_fast() {
    let err = BatchRunner::new(
        BatchConfig::new(1),
        Arc::new(FsSourceResolver::new(None, None)),
        Arc::new(StripNewlines),
    )
    .run(vec![FileTask::for_month(2009, 1)])
    .await
    .expect_err("no output root");
    assert!(matches!(err, PipelineError::Other(_)), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwritable_output_skips_only_that_file() {
    let temp = TempDir::new().expect("tempdir");
    let unzipped = temp.path().join("unzipped");
    let out = temp.path().join("out");
    let blocked = FileTask::for_month(2008, 1);
    let good = FileTask::for_month(2008, 2);
    write_plain(&unzipped, &blocked, &record_lines(20, 0));
    write_plain(&unzipped, &good, &record_lines(30, 0));
    // A directory where the output file should go.
    fs::create_dir_all(out.join(blocked.relative())).expect("blocking dir");

    let summary = BatchRunner::new(
        BatchConfig::new(2),
        Arc::new(FsSourceResolver::new(Some(unzipped), None)),
        Arc::new(StripNewlines),
    )
    .with_output(OutputLayout::new(&out))
    .run(vec![blocked.clone(), good.clone()])
    .await
    .expect("batch");

    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.total("Total"), Some(30));
    assert_eq!(summary.total("Written"), Some(30));
    assert_eq!(summary.pool.returned, 2);
    assert!(out.join(blocked.relative()).is_dir());

    let written = fs::read_to_string(out.join(good.relative())).expect("output file");
    assert_eq!(written.lines().count(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncated_bz2_archive_contributes_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let zipped = temp.path().join("zipped");
    let task = FileTask::for_month(2009, 9);
    write_bz2(&zipped, &task, &record_lines(20_000, 0));

    let path = zipped.join(format!("{}.bz2", task.relative()));
    let bytes = fs::read(&path).expect("archive bytes");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    let summary = BatchRunner::new(
        BatchConfig::new(1),
        Arc::new(FsSourceResolver::new(None, Some(zipped))),
        Arc::new(SizeBuckets),
    )
    .run(vec![task])
    .await
    .expect("batch completes");

    assert_eq!(summary.total("Total"), Some(0));
    assert_eq!(summary.total("Errors"), Some(0));
    assert_eq!(summary.files_processed, 0);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.pool.in_flight, 0);
}

/// Tracks how many archives are being read at the same time.
#[derive(Default)]
struct Activity {
    active: AtomicUsize,
    max_active: AtomicUsize,
    finished: AtomicUsize,
}

struct ActiveGuard(Arc<Activity>);

impl ActiveGuard {
    fn enter(activity: Arc<Activity>) -> Self {
        let now = activity.active.fetch_add(1, Ordering::SeqCst) + 1;
        activity.max_active.fetch_max(now, Ordering::SeqCst);
        Self(activity)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

struct SlowReader {
    inner: Cursor<Vec<u8>>,
    delay: Duration,
    slept: bool,
    _guard: ActiveGuard,
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.slept {
            std::thread::sleep(self.delay);
            self.slept = true;
        }
        self.inner.read(buf)
    }
}

struct SlowResolver {
    activity: Arc<Activity>,
    delay: Duration,
    lines_per_file: usize,
}

impl SourceResolver for SlowResolver {
    fn open(&self, task: &FileTask) -> archive_pipeline::Result<OpenedSource> {
        let guard = ActiveGuard::enter(self.activity.clone());
        let reader = SlowReader {
            inner: Cursor::new(record_lines(self.lines_per_file, 0).into_bytes()),
            delay: self.delay,
            slept: false,
            _guard: guard,
        };
        Ok(OpenedSource {
            file: ResolvedFile {
                task: task.clone(),
                path: PathBuf::from(task.relative()),
                form: SourceForm::Plain,
            },
            reader: Box::new(BufReader::new(reader)),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_reader_limit() {
    for readers in 1..=4 {
        let activity = Arc::new(Activity::default());
        let resolver = SlowResolver {
            activity: activity.clone(),
            delay: Duration::from_millis(15),
            lines_per_file: 3,
        };
        let tasks: Vec<_> = (1..=10).map(|m| FileTask::for_month(2012, m)).collect();

        let summary = BatchRunner::new(
            BatchConfig::new(readers),
            Arc::new(resolver),
            Arc::new(SizeBuckets),
        )
        .run(tasks)
        .await
        .expect("batch");

        assert!(activity.max_active.load(Ordering::SeqCst) <= readers);
        assert!(summary.pool.peak <= readers);
        assert_eq!(summary.total("Total"), Some(30));
        assert_eq!(activity.finished.load(Ordering::SeqCst), 10);
    }
}

/// Records how many workers had finished when each metric was reported.
struct BarrierCheck {
    activity: Arc<Activity>,
    seen: Mutex<Vec<(String, usize)>>,
}

impl ScoreReporter for BarrierCheck {
    fn report(&self, metric: &str, _total: i64) {
        let finished = self.activity.finished.load(Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((metric.to_string(), finished));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aggregators_shut_down_only_after_every_worker_returns() {
    let activity = Arc::new(Activity::default());
    let resolver = SlowResolver {
        activity: activity.clone(),
        delay: Duration::from_millis(60),
        lines_per_file: 5,
    };
    let reporter = Arc::new(BarrierCheck {
        activity: activity.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let tasks: Vec<_> = (1..=6).map(|m| FileTask::for_month(2013, m)).collect();

    let summary = BatchRunner::new(BatchConfig::new(2), Arc::new(resolver), Arc::new(SizeBuckets))
        .with_reporter(reporter.clone())
        .run(tasks)
        .await
        .expect("batch");

    let seen = reporter.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2 + SIZE_BUCKETS.len());
    assert!(seen.iter().all(|(_, finished)| *finished == 6), "{seen:?}");
    assert_eq!(summary.total("Total"), Some(30));
    assert_eq!(summary.pool.returned, 6);
}

#[tokio::test]
async fn empty_batch_completes_with_zero_totals() {
    let summary = BatchRunner::new(
        BatchConfig::new(3),
        Arc::new(FsSourceResolver::new(None, None)),
        Arc::new(SizeBuckets),
    )
    .run(Vec::new())
    .await
    .expect("batch");

    assert!(summary.totals.iter().all(|t| t.total == 0));
    assert_eq!(summary.files_processed + summary.files_skipped, 0);
}
