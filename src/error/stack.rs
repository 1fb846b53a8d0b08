use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;

/// One captured call-stack entry, filtered and ordered per [`capture`].
#[derive(Clone, Debug)]
pub struct Frame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function)?;
        if let Some(file) = &self.file {
            write!(f, "\n    {file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

type FrameFilter = dyn Fn(&Frame) -> bool + Send + Sync;

static MAX_FRAMES: AtomicUsize = AtomicUsize::new(5);
static FRAME_FILTER: Lazy<RwLock<Box<FrameFilter>>> =
    Lazy::new(|| RwLock::new(Box::new(skip_none)));

fn skip_none(_: &Frame) -> bool {
    false
}

/// Sets the process-wide maximum number of frames captured per [`StructuredError`](super::StructuredError).
pub fn set_max_frames(n: usize) {
    MAX_FRAMES.store(n, Ordering::Relaxed);
}

/// Installs the process-wide frame filter predicate. Frames for which it returns `true`
/// are skipped (not counted against the max) and capture continues past them.
pub fn set_frame_filter(filter: impl Fn(&Frame) -> bool + Send + Sync + 'static) {
    *FRAME_FILTER.write().expect("frame filter lock poisoned") = Box::new(filter);
}

/// Captures up to the configured maximum number of caller frames, skipping any for
/// which the installed filter predicate returns `true` and continuing past them so
/// the capture still reaches its target count when possible.
pub fn capture() -> Vec<Frame> {
    let max = MAX_FRAMES.load(Ordering::Relaxed);
    if max == 0 {
        return Vec::new();
    }

    let filter = FRAME_FILTER.read().expect("frame filter lock poisoned");
    let mut frames = Vec::with_capacity(max);
    backtrace::trace(|bt_frame| {
        backtrace::resolve_frame(bt_frame, |symbol| {
            if frames.len() >= max {
                return;
            }
            let frame = Frame {
                function: symbol
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                file: symbol.filename().map(|p| p.display().to_string()),
                line: symbol.lineno(),
            };
            if !filter(&frame) {
                frames.push(frame);
            }
        });
        frames.len() < max
    });
    frames
}
