#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use reelkeep_core::{ErrorKind, LibraryConfig, MediaFilter};
use reelkeep_ops::{ClipSegment, Library, ToolLocator, cut_clips};

/// Stand-in encoder: logs its arguments and writes the last one as output.
const CUTTER: &str = r#"
echo "$@" >> "$(dirname "$0")/calls.log"
for arg; do out="$arg"; done
printf 'clip' > "$out"
exit 0
"#;

const BROKEN_CUTTER: &str = r#"
echo "Invalid duration specification for ss" >&2
exit 1
"#;

const LAZY_CUTTER: &str = "exit 0";

struct Fixture {
    temp: TempDir,
    media: PathBuf,
    bin: PathBuf,
}

impl Fixture {
    fn new(cutter: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let media = temp.path().join("media");
        let bin = temp.path().join("bin");
        fs::create_dir_all(media.join("games")).unwrap();
        fs::create_dir_all(&bin).unwrap();
        fs::write(media.join("games/derby [goal].mp4"), "source").unwrap();
        fs::write(media.join("games/notes.txt"), "n").unwrap();

        let script = bin.join("ffmpeg");
        fs::write(&script, format!("#!/bin/sh\n{cutter}\n")).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        Self { temp, media, bin }
    }

    fn locator(&self) -> ToolLocator {
        ToolLocator::only(vec![self.bin.clone()])
    }

    fn library(&self) -> Library {
        let config = LibraryConfig::builder()
            .media_root(&self.media)
            .state_dir(self.temp.path().join("state"))
            .tool_candidates(vec![self.bin.clone()])
            .build()
            .unwrap();
        Library::new(config)
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.bin.join("calls.log"))
            .map(|log| log.lines().map(String::from).collect())
            .unwrap_or_default()
    }
}

fn exists(root: &Path, rel: &str) -> bool {
    root.join(rel).is_file()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cut_clips_numbers_and_keeps_tags() {
    let fx = Fixture::new(CUTTER);
    fs::write(fx.media.join("games/derby_01 [goal].mp4"), "taken").unwrap();

    let segments = [ClipSegment::new(0.0, 1.5), ClipSegment::new(10.0, 12.25)];
    let outcome = cut_clips(
        &fx.locator(),
        &fx.media,
        &MediaFilter::default(),
        "games/derby [goal].mp4",
        &segments,
    )
    .await
    .unwrap();

    assert_eq!(outcome.source_relpath, "games/derby [goal].mp4");
    let names: Vec<&str> = outcome.created.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["derby_02 [goal].mp4", "derby_03 [goal].mp4"]);
    assert_eq!(outcome.created[0].relpath, "games/derby_02 [goal].mp4");
    assert_eq!(outcome.created[0].index, 2);
    assert_eq!(outcome.created[1].start, 10.0);
    assert!(exists(&fx.media, "games/derby_03 [goal].mp4"));

    let calls = fx.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("-ss 0 -t 1.5 -i"), "{}", calls[0]);
    assert!(calls[1].contains("-ss 10 -t 2.25 -i"), "{}", calls[1]);
    assert!(calls[1].contains("-c copy"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_request_writes_nothing() {
    let fx = Fixture::new(CUTTER);
    let locator = fx.locator();
    let filter = MediaFilter::default();
    let source = "games/derby [goal].mp4";

    // the bad second segment rejects the whole request
    let segments = [ClipSegment::new(0.0, 1.0), ClipSegment::new(5.0, 5.01)];
    let err = cut_clips(&locator, &fx.media, &filter, source, &segments)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let one = [ClipSegment::new(0.0, 1.0)];
    let err = cut_clips(&locator, &fx.media, &filter, "games/missing.mp4", &one)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = cut_clips(&locator, &fx.media, &filter, "games/notes.txt", &one)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = cut_clips(&locator, &fx.media, &filter, "../outside.mp4", &one)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);

    assert!(fx.calls().is_empty());
    assert!(!exists(&fx.media, "games/derby_01 [goal].mp4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cutter_failures_are_reported() {
    let segments = [ClipSegment::new(0.0, 1.0)];
    let source = "games/derby [goal].mp4";
    let filter = MediaFilter::default();

    let fx = Fixture::new(BROKEN_CUTTER);
    let err = cut_clips(&fx.locator(), &fx.media, &filter, source, &segments)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolFailed);
    assert!(err.to_string().contains("Invalid duration"), "{err}");

    let fx = Fixture::new(LAZY_CUTTER);
    let err = cut_clips(&fx.locator(), &fx.media, &filter, source, &segments)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolFailed);
    assert!(err.to_string().contains("was not created"), "{err}");

    let nowhere = fx.temp.path().join("no-tools");
    let err = cut_clips(&ToolLocator::only(vec![nowhere]), &fx.media, &filter, source, &segments)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolMissing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_library_clips_refresh_tag_index() {
    let fx = Fixture::new(CUTTER);
    let lib = fx.library();
    let before = lib.tags().get(false).unwrap();
    assert_eq!(before.entries.len(), 1);
    let builds = lib.tags().rebuild_count();

    let outcome = lib
        .cut_clips("games/derby [goal].mp4", &[ClipSegment::new(1.0, 2.0)])
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 1);

    tokio::time::timeout(Duration::from_secs(10), async {
        while lib.tags().rebuild_count() == builds || lib.tags().status().building {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tag index never rebuilt");

    let after = lib.tags().get(false).unwrap();
    let paths: Vec<&str> = after.entries.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"games/derby_01 [goal].mp4"), "{paths:?}");
}
