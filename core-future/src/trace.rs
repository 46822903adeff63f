//! Diagnostic traces.
//!
//! A [`Trace`] always records the caller location (through `#[track_caller]`)
//! and, when backtrace capture is enabled, a full backtrace. Frames belonging
//! to the fiber and future machinery are trimmed from the head of the
//! backtrace when it is rendered, so the first frame shown is user code.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static CAPTURE_BACKTRACES: AtomicBool = AtomicBool::new(false);

/// Frame prefixes that are never interesting to the reader of a trace.
const INTERNAL_FRAMES: &[&str] = &["std::backtrace", "core_future::", "core_fiber::"];

pub(crate) fn set_capture_backtraces(enabled: bool) {
    CAPTURE_BACKTRACES.store(enabled, Ordering::Relaxed);
}

pub(crate) fn capture_backtraces() -> bool {
    CAPTURE_BACKTRACES.load(Ordering::Relaxed)
}

/// Where something happened.
#[derive(Clone)]
pub struct Trace {
    location: &'static Location<'static>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Trace {
    /// Captures the trace of the caller.
    #[track_caller]
    pub fn capture() -> Self {
        let backtrace = if capture_backtraces() {
            Some(Arc::new(Backtrace::force_capture()))
        } else {
            None
        };
        Self {
            location: Location::caller(),
            backtrace,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Backtrace frames with the internal head removed, one string per frame.
    pub fn frames(&self) -> Vec<String> {
        match &self.backtrace {
            Some(backtrace) => trim_internal(&backtrace.to_string()),
            None => Vec::new(),
        }
    }
}

fn trim_internal(rendered: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in rendered.lines() {
        if is_frame_start(line) || frames.is_empty() {
            frames.push(line.to_string());
        } else if let Some(frame) = frames.last_mut() {
            frame.push('\n');
            frame.push_str(line);
        }
    }

    let skip = frames
        .iter()
        .take_while(|frame| {
            let head = frame.lines().next().unwrap_or_default();
            INTERNAL_FRAMES.iter().any(|prefix| head.contains(prefix))
        })
        .count();
    frames.split_off(skip)
}

/// Frame heads look like `  12: crate::module::function`.
fn is_frame_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.split_once(':') {
        Some((index, _)) => !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "    at {}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;
        for frame in self.frames() {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("location", &self.location)
            .field("backtrace", &self.backtrace.is_some())
            .finish()
    }
}
