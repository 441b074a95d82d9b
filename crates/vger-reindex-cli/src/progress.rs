use std::io::{self, IsTerminal, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::MakeWriter;
use vger_reindex::commands::rebuild_index::{RebuildProgressEvent, RebuildStage};

const PROGRESS_REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// True while a progress line is being displayed on stderr.
static PROGRESS_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes all stderr writes between the progress renderer and tracing.
static STDERR_LOCK: Mutex<()> = Mutex::new(());

fn acquire_stderr_lock() -> MutexGuard<'static, ()> {
    STDERR_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// A [`MakeWriter`] that clears the progress line before each tracing event,
/// preventing log messages from corrupting the `\r`-based progress display.
pub(crate) struct ProgressAwareStderr;

/// Holds the `STDERR_LOCK` guard for the entire lifetime of a single tracing
/// write, so the lock spans from the line-clear through the full log message.
pub(crate) struct ProgressWriter {
    _guard: MutexGuard<'static, ()>,
    inner: Stderr,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressAwareStderr {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let guard = acquire_stderr_lock();
        let mut stderr = io::stderr();

        if PROGRESS_ACTIVE.load(Relaxed) && stderr.is_terminal() {
            let _ = stderr.write_all(b"\r\x1b[2K");
        }

        ProgressWriter {
            _guard: guard,
            inner: stderr,
        }
    }
}

/// Single-line `\r` progress display for a rebuild. Draws nothing unless
/// stderr is a terminal.
pub(crate) struct RebuildProgressRenderer {
    enabled: bool,
    line: String,
    last_draw: Instant,
    last_line_len: usize,
    rendered_any: bool,
    removed: usize,
}

impl RebuildProgressRenderer {
    pub(crate) fn new(enabled: bool) -> Self {
        let enabled = enabled && io::stderr().is_terminal();
        PROGRESS_ACTIVE.store(enabled, Relaxed);
        Self {
            enabled,
            line: String::new(),
            last_draw: Instant::now(),
            last_line_len: 0,
            rendered_any: false,
            removed: 0,
        }
    }

    pub(crate) fn on_event(&mut self, event: RebuildProgressEvent) {
        let (line, force) = match event {
            RebuildProgressEvent::StageStarted { stage } => match stage {
                RebuildStage::Enumerating => ("Listing packs...".to_string(), true),
                RebuildStage::CollectingStale => ("Listing old index files...".to_string(), true),
                RebuildStage::Building => ("Building index...".to_string(), true),
                _ => return,
            },
            RebuildProgressEvent::PacksListed { total, ignored } => {
                let suffix = if ignored > 0 {
                    format!(" ({ignored} ignored)")
                } else {
                    String::new()
                };
                (format!("Found {total} packs{suffix}"), true)
            }
            RebuildProgressEvent::PackScanned { completed, total } => (
                format!("Scanning packs: {completed}/{total}"),
                completed == total,
            ),
            RebuildProgressEvent::StaleIndexesListed { count } => {
                (format!("Found {count} old index files"), true)
            }
            RebuildProgressEvent::ShardsPlanned { shards, blobs } => {
                (format!("Planned {shards} index files for {blobs} blobs"), true)
            }
            RebuildProgressEvent::ShardSaved { shard, total, .. } => {
                (format!("Saving index files: {shard}/{total}"), shard == total)
            }
            RebuildProgressEvent::IndexRemoved { .. } => {
                self.removed += 1;
                (format!("Removed old index files: {}", self.removed), false)
            }
            RebuildProgressEvent::IndexRemovalFailed { .. } => return,
        };
        self.line = line;
        self.render(force);
    }

    pub(crate) fn finish(&mut self) {
        if !self.rendered_any {
            PROGRESS_ACTIVE.store(false, Relaxed);
            return;
        }
        self.render(true);
        {
            let _guard = acquire_stderr_lock();
            eprintln!();
        }
        PROGRESS_ACTIVE.store(false, Relaxed);
        self.rendered_any = false;
        self.last_line_len = 0;
    }

    fn render(&mut self, force: bool) {
        if !self.enabled {
            return;
        }
        if !force && self.rendered_any && self.last_draw.elapsed() < PROGRESS_REDRAW_INTERVAL {
            return;
        }
        self.last_draw = Instant::now();

        let line_len = self.line.chars().count();
        let pad_len = self.last_line_len.saturating_sub(line_len);
        {
            let _guard = acquire_stderr_lock();
            eprint!("\r{}{}", self.line, " ".repeat(pad_len));
            let _ = io::stderr().flush();
        }

        self.last_line_len = line_len;
        self.rendered_any = true;
    }
}

impl Drop for RebuildProgressRenderer {
    fn drop(&mut self) {
        if self.rendered_any {
            self.finish();
        }
    }
}
