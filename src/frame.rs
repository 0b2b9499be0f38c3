use std::fmt;

use crate::backend;

/// One captured stack frame: a raw return address, nothing else.
///
/// A `Frame` never owns memory and is trivially copyable, so arrays of frames
/// can live on the stack of a signal handler. Address zero is the "empty"
/// sentinel. Ordering, equality and hashing are all derived from the address
/// alone, which keeps them mutually consistent and async-signal-safe.
///
/// Symbol information is not stored here; [`name`](Frame::name) and friends
/// ask the active backend every time they are called. Those accessors may
/// allocate and must not be used from a signal handler.
// repr(transparent) lets backends hand a `&mut [Frame]` straight to C
// unwinders that expect an address buffer.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Frame {
    addr: usize,
}

impl Frame {
    /// Wraps a raw instruction address. O(1), infallible, signal-safe.
    pub const fn new(addr: usize) -> Frame {
        Frame { addr }
    }

    /// A frame referencing no address. Equivalent to `Frame::new(0)`.
    ///
    /// `const` so signal handlers can keep capture buffers in statics.
    pub const fn empty() -> Frame {
        Frame { addr: 0 }
    }

    /// The stored address, unchanged. O(1), signal-safe.
    pub fn address(&self) -> usize {
        self.addr
    }

    /// True iff the address is zero.
    pub fn is_empty(&self) -> bool {
        self.addr == 0
    }

    /// The function name for this address, demangled where possible.
    ///
    /// Returns `""` when the backend cannot resolve the address: symbolization
    /// is best-effort diagnostic data, and a failed lookup must not take the
    /// rest of a crash report down with it. NOT signal-safe.
    pub fn name(&self) -> String {
        backend::resolve(self.addr).name
    }

    /// Path of the source file defining this frame's function.
    ///
    /// Returns `""` whenever [`source_line`](Frame::source_line) would return
    /// 0, even if the backend knows a file path without a line. NOT
    /// signal-safe.
    pub fn source_file(&self) -> String {
        backend::resolve(self.addr).file
    }

    /// Line in the source file, or 0 when unknown. NOT signal-safe.
    pub fn source_line(&self) -> u32 {
        backend::resolve(self.addr).line
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame")
            .field("address", &format_args!("{:#x}", self.addr))
            .finish()
    }
}

/// Renders the backend's one-line text form for this frame. NOT signal-safe.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(backend::to_string(self.addr).trim_end_matches('\n'))
    }
}
