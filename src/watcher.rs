use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::batch::{self, BatchError};
use crate::transform::CanvasGeometry;

/// Editors and cameras emit a burst of create/modify events while a file
/// is still being written. A path is only processed once no further
/// events have arrived for it within this window, so the final event of
/// the burst wins and the file is read complete.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// How long to block on the event channel when nothing is pending.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// Paths with recent events, waiting out the debounce window. Entries
/// leave the map as soon as they are handed back by `due`, so the map
/// only holds files currently settling.
struct PendingFiles {
    window: Duration,
    last_event: HashMap<PathBuf, Instant>,
}

impl PendingFiles {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: HashMap::new(),
        }
    }

    /// Record an event for the path, restarting its debounce window.
    fn note(&mut self, path: PathBuf, now: Instant) {
        self.last_event.insert(path, now);
    }

    /// Remove and return every path whose last event is older than the
    /// window — those files have gone quiet and are safe to read.
    fn due(&mut self, now: Instant) -> Vec<PathBuf> {
        let ready: Vec<PathBuf> = self
            .last_event
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= self.window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.last_event.remove(path);
        }
        ready
    }

    /// Time until the next path becomes due, if anything is pending.
    fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.last_event
            .values()
            .map(|last| {
                let elapsed = now.duration_since(*last);
                self.window.saturating_sub(elapsed)
            })
            .min()
    }

    fn is_empty(&self) -> bool {
        self.last_event.is_empty()
    }
}

/// Refuse to watch a folder that contains the output folder: every JPEG
/// written there would fire a fresh create event and feed back into the
/// pipeline indefinitely.
fn ensure_output_outside(input_dir: &Path, output_dir: &Path) -> Result<(), BatchError> {
    let input = input_dir.canonicalize()?;
    // The output folder may not exist yet; resolve through its parent so
    // symlinked paths still compare against the canonical input.
    let output = match output_dir.canonicalize() {
        Ok(path) => path,
        Err(_) => match output_dir.parent() {
            Some(parent) => parent
                .canonicalize()
                .map(|p| p.join(output_dir.file_name().unwrap_or_default()))
                .unwrap_or_else(|_| output_dir.to_path_buf()),
            None => output_dir.to_path_buf(),
        },
    };

    if output == input || output.starts_with(&input) {
        return Err(BatchError::OutputInsideInput {
            input: input_dir.to_path_buf(),
            output: output_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Keep watching `input_dir` and run every newly created or modified
/// image through the transform pipeline. Runs until the process is
/// stopped; per-file failures are logged and skipped like the scan, and
/// a later modify event queues the file again.
pub fn watch_folder(
    input_dir: &Path,
    output_dir: &Path,
    geometry: &CanvasGeometry,
) -> Result<(), BatchError> {
    ensure_output_outside(input_dir, output_dir)?;

    let (tx, rx) = mpsc::channel();

    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        if path.is_file() && batch::is_image_file(&path) {
                            tx.send(path).ok();
                        }
                    }
                }
            }
            Err(e) => eprintln!("⚠ Watch error: {}", e),
        },
        notify::Config::default(),
    )?;
    watcher.watch(input_dir, RecursiveMode::NonRecursive)?;

    println!("🔎 Watching {} (Ctrl-C to stop)", input_dir.display());

    let mut pending = PendingFiles::new(DEBOUNCE_WINDOW);
    loop {
        let wait = if pending.is_empty() {
            IDLE_WAIT
        } else {
            pending.next_deadline(Instant::now()).unwrap_or(IDLE_WAIT)
        };
        match rx.recv_timeout(wait) {
            Ok(path) => pending.note(path, Instant::now()),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        for path in pending.due(Instant::now()) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match batch::process_file(&path, output_dir, geometry) {
                Ok(output_path) => println!(
                    "✓ Processed: {} -> {}",
                    name,
                    output_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                ),
                Err(e) => {
                    log::warn!("skipping {}: {}", name, e);
                    eprintln!("⚠ Skipping {}: {}", name, e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "canvas_resizer_watch_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_slow_write_is_processed_after_it_settles() {
        // A file written in two chunks 600ms apart must not be read at
        // the first event; it becomes due only after the last one.
        let mut pending = PendingFiles::new(Duration::from_secs(2));
        let start = Instant::now();
        let path = PathBuf::from("/tmp/in/photo.jpg");

        pending.note(path.clone(), start);
        pending.note(path.clone(), start + Duration::from_millis(600));

        assert!(pending.due(start + Duration::from_millis(700)).is_empty());
        assert!(pending.due(start + Duration::from_millis(2500)).is_empty());
        assert_eq!(
            pending.due(start + Duration::from_millis(2700)),
            vec![path]
        );
    }

    #[test]
    fn test_due_drains_processed_entries() {
        let mut pending = PendingFiles::new(Duration::from_secs(2));
        let start = Instant::now();
        for i in 0..100 {
            pending.note(PathBuf::from(format!("/tmp/in/{i}.jpg")), start);
        }

        let ready = pending.due(start + Duration::from_secs(3));
        assert_eq!(ready.len(), 100);
        // Nothing lingers once handed out; the map does not accumulate
        // history over a long-running watch.
        assert!(pending.is_empty());
        assert!(pending.due(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_reprocessing_after_later_modify() {
        let mut pending = PendingFiles::new(Duration::from_secs(2));
        let start = Instant::now();
        let path = PathBuf::from("/tmp/in/photo.jpg");

        pending.note(path.clone(), start);
        assert_eq!(pending.due(start + Duration::from_secs(3)), vec![path.clone()]);

        // The same file modified again later queues again.
        pending.note(path.clone(), start + Duration::from_secs(10));
        assert_eq!(pending.due(start + Duration::from_secs(13)), vec![path]);
    }

    #[test]
    fn test_next_deadline_tracks_newest_event() {
        let mut pending = PendingFiles::new(Duration::from_secs(2));
        let start = Instant::now();
        assert_eq!(pending.next_deadline(start), None);

        pending.note(PathBuf::from("/tmp/in/a.jpg"), start);
        let deadline = pending.next_deadline(start + Duration::from_millis(500)).unwrap();
        assert_eq!(deadline, Duration::from_millis(1500));
    }

    #[test]
    fn test_watch_rejects_output_equal_to_input() {
        let dir = temp_dir("same");
        assert!(matches!(
            watch_folder(&dir, &dir, &CanvasGeometry::default()),
            Err(BatchError::OutputInsideInput { .. })
        ));
    }

    #[test]
    fn test_watch_rejects_output_nested_in_input() {
        let input = temp_dir("nested");
        let output = input.join("done");
        fs::create_dir_all(&output).unwrap();
        assert!(matches!(
            watch_folder(&input, &output, &CanvasGeometry::default()),
            Err(BatchError::OutputInsideInput { .. })
        ));
    }

    #[test]
    fn test_sibling_output_is_accepted() {
        let base = temp_dir("siblings");
        let input = base.join("input");
        let output = base.join("output");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        assert!(ensure_output_outside(&input, &output).is_ok());
    }

    #[test]
    fn test_missing_output_is_still_checked_lexically() {
        let input = temp_dir("lexical");
        // Output does not exist yet but its path sits inside the input.
        assert!(ensure_output_outside(&input, &input.join("not_yet_created")).is_err());
    }
}
