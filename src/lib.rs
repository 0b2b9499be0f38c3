//! Async-signal-safe stack capture with lazy symbolization.
//!
//! Capturing a stack and making it readable are two very different jobs. The
//! first has to work from inside a crashing signal handler, so it must not
//! allocate or take locks. The second wants to open binaries, parse debug
//! info and maybe even spawn a symbolizer, so it must not run in a signal
//! handler. This crate keeps the two phases strictly apart:
//!
//! 1. [`collect`] fills a caller-supplied buffer with raw return addresses.
//!    Safe anywhere, including signal handlers. Never fails; a short or empty
//!    capture is the only failure mode.
//! 2. [`Frame::name`], [`Frame::source_file`], [`Frame::source_line`] and
//!    [`format_frames`] resolve addresses on demand through the active
//!    backend. Normal contexts only.
//!
//! Exactly one backend is compiled in per build. By default that is the
//! dbghelp engine on Windows, the `addr2line`-based offline symbolizer on
//! Unix, and a no-op everywhere else; the `noop`, `dbghelp`, `addr2line` and
//! `libunwind` cargo features force a specific choice.
//!
//! ```no_run
//! let mut buf = [stackshot::Frame::empty(); 64];
//! let n = stackshot::collect(&mut buf);
//! // ... later, outside any signal handler ...
//! print!("{}", stackshot::format_frames(&buf[..n]));
//! ```

mod backend;
mod frame;

pub use crate::frame::Frame;

/// Captures the current call stack into `buf`, innermost frame first.
///
/// Returns the number of frames written, at most `buf.len()`. The frame of
/// `collect` itself is skipped, so `buf[0]` is the immediate caller. A count
/// of zero means capture was not possible; there is no error to inspect.
///
/// Async-signal-safe: no heap allocation and no locking. This is the only
/// entry point in the crate (besides the trivial `Frame` accessors) with
/// that guarantee.
#[inline(never)]
pub fn collect(buf: &mut [Frame]) -> usize {
    backend::collect(buf)
}

/// Renders `frames` as multi-line human-readable text, one line per frame.
///
/// The output is exactly the concatenation of the per-frame lines, but the
/// active backend is free to batch the underlying symbol lookups (the offline
/// symbolizer runs one resolver process per module instead of one per frame).
///
/// NOT async-signal-safe.
pub fn format_frames(frames: &[Frame]) -> String {
    backend::to_string_many(frames)
}
