//! Output tailer: incremental reader of the interpreter's output file.
//!
//! The remote session mirrors its textual output into a file; the tailer
//! watches that file for appended lines from its own thread, independent of
//! how fast the remote writer produces them. Each complete line runs through
//! the tag protocol filter: visible text goes to the caller's sink (flushed
//! per line, since the sink is typically an interactive console), progress
//! events go to the task progress file, and the end-of-output sentinel stops
//! the loop.
//!
//! Tail semantics: reading starts at the end of the file as it was when the
//! tailer started; pre-existing content is never replayed.
//!
//! The owner joins the thread with a bounded timeout at teardown. A tailer
//! that does not terminate in time is abandoned (its stop flag raised so it
//! exits at the next poll) rather than allowed to block cleanup.

use crate::progress;
use crate::protocol::TagFilter;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The sink receiving the filtered visible text.
pub type OutputSink = Box<dyn Write + Send>;

/// What the tailer thread observed, returned through [`TailerHandle::join`].
#[derive(Debug, Default)]
pub struct TailerOutcome {
    /// Error report finalized by the tag filter, if the script raised one.
    pub error_report: Option<String>,
    /// Whether the end-of-output sentinel was observed.
    pub saw_end_of_output: bool,
    /// Read, parse, or sink failure that stopped the tailer early.
    pub failure: Option<String>,
}

/// Handle to a running tailer thread.
pub struct TailerHandle {
    thread: JoinHandle<TailerOutcome>,
    stop: Arc<AtomicBool>,
}

impl TailerHandle {
    /// Ask the tailer to stop at its next poll.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the tailer thread to finish, bounded by `timeout`.
    ///
    /// Returns `None` if the thread did not terminate in time; in that case
    /// its stop flag is raised and the thread is abandoned so the caller can
    /// proceed with cleanup. `None` is also returned if the thread panicked.
    pub fn join(self, timeout: Duration) -> Option<TailerOutcome> {
        let start = Instant::now();
        let poll = Duration::from_millis(10);

        while !self.thread.is_finished() {
            if start.elapsed() >= timeout {
                self.stop.store(true, Ordering::SeqCst);
                return None;
            }
            thread::sleep(poll);
        }

        self.thread.join().ok()
    }
}

/// Start tailing `path` on a new thread.
///
/// The read position is fixed at the current end of the file before this
/// function returns, so every line appended afterwards is observed.
pub fn start(
    path: &Path,
    poll_interval: Duration,
    sink: OutputSink,
    progress_file: Option<PathBuf>,
) -> io::Result<TailerHandle> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::End(0))?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name("rlink-tailer".to_string())
        .spawn(move || run_loop(reader, poll_interval, sink, progress_file, stop_flag))?;

    Ok(TailerHandle { thread, stop })
}

fn run_loop(
    mut reader: BufReader<File>,
    poll_interval: Duration,
    mut sink: OutputSink,
    progress_file: Option<PathBuf>,
    stop: Arc<AtomicBool>,
) -> TailerOutcome {
    let mut filter = TagFilter::new();
    let mut outcome = TailerOutcome::default();
    // Carries a partial line across polls until its newline arrives.
    let mut pending = String::new();

    'poll: while !stop.load(Ordering::SeqCst) {
        loop {
            let mut chunk = String::new();
            match reader.read_line(&mut chunk) {
                Ok(0) => break,
                Ok(_) => {
                    pending.push_str(&chunk);
                    if !pending.ends_with('\n') {
                        break;
                    }
                    let line = pending.trim_end_matches('\n').trim_end_matches('\r');
                    match handle_line(&mut filter, &mut sink, &progress_file, line) {
                        Ok(LineOutcome::Continue) => {}
                        Ok(LineOutcome::EndOfOutput) => {
                            outcome.saw_end_of_output = true;
                            pending.clear();
                            break 'poll;
                        }
                        Err(failure) => {
                            outcome.failure = Some(failure);
                            pending.clear();
                            break 'poll;
                        }
                    }
                    pending.clear();
                }
                Err(e) => {
                    outcome.failure = Some(format!("failed to read output file: {}", e));
                    break 'poll;
                }
            }
        }
        thread::sleep(poll_interval);
    }

    let _ = sink.flush();
    outcome.error_report = filter.take_error_report();
    outcome
}

enum LineOutcome {
    Continue,
    EndOfOutput,
}

fn handle_line(
    filter: &mut TagFilter,
    sink: &mut OutputSink,
    progress_file: &Option<PathBuf>,
    line: &str,
) -> std::result::Result<LineOutcome, String> {
    let filtered = filter
        .filter_line(line)
        .map_err(|e| format!("output protocol fault: {}", e))?;

    if let Some(value) = filtered.progress
        && let Some(path) = progress_file
        && let Err(e) = progress::set_progress(path, value)
    {
        // Progress updates are advisory; a failed write must not kill the
        // output stream.
        eprintln!("Warning: failed to write progress file: {}", e);
    }

    if let Some(text) = filtered.visible {
        writeln!(sink, "{}", text)
            .and_then(|_| sink.flush())
            .map_err(|e| format!("failed to write to output sink: {}", e))?;
    }

    if filtered.end_of_output {
        return Ok(LineOutcome::EndOfOutput);
    }
    Ok(LineOutcome::Continue)
}
