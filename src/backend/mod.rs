//! Backend selection and dispatch.
//!
//! Exactly one strategy implements capture and symbolization for a given
//! build. The selection is fixed at compile time: a forced choice through the
//! `noop`/`dbghelp`/`addr2line`/`libunwind` features wins, otherwise the
//! platform default applies (dbghelp on Windows, addr2line on Unix), and a
//! target with neither gets the no-op strategy so the crate always builds.

use crate::frame::Frame;

#[cfg(any(
    all(feature = "noop", any(feature = "dbghelp", feature = "addr2line", feature = "libunwind")),
    all(feature = "dbghelp", any(feature = "addr2line", feature = "libunwind")),
    all(feature = "addr2line", feature = "libunwind"),
))]
compile_error!(
    "backend features are mutually exclusive: enable at most one of \
     `noop`, `dbghelp`, `addr2line`, `libunwind`"
);

#[cfg(all(feature = "dbghelp", not(windows)))]
compile_error!("the `dbghelp` backend is only available on Windows");

#[cfg(all(feature = "addr2line", not(unix)))]
compile_error!("the `addr2line` backend is only available on Unix");

#[cfg(all(feature = "libunwind", not(target_os = "linux")))]
compile_error!("the `libunwind` backend is only available on Linux");

cfg_if::cfg_if! {
    if #[cfg(feature = "noop")] {
        mod noop;
        use self::noop::Noop as Active;
    } else if #[cfg(feature = "dbghelp")] {
        mod dbghelp;
        use self::dbghelp::DbgHelp as Active;
    } else if #[cfg(feature = "addr2line")] {
        mod addr2line;
        use self::addr2line::Addr2Line as Active;
    } else if #[cfg(feature = "libunwind")] {
        mod libunwind;
        use self::libunwind::Libunwind as Active;
    } else if #[cfg(windows)] {
        mod dbghelp;
        use self::dbghelp::DbgHelp as Active;
    } else if #[cfg(unix)] {
        mod addr2line;
        use self::addr2line::Addr2Line as Active;
    } else {
        mod noop;
        use self::noop::Noop as Active;
    }
}

/// Symbol information for one address. Ephemeral; produced per lookup.
///
/// Empty strings and a zero line mean "unknown". Backends fill in whatever
/// they can; the consistency rule (no file without a line) is applied here,
/// not in each backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Symbol {
    pub name: String,
    pub file: String,
    pub line: u32,
}

impl Symbol {
    pub fn unknown() -> Symbol {
        Symbol::default()
    }
}

/// The strategy interface. One implementation is linked in per build.
pub(crate) trait Backend {
    /// Fills `buf` with return addresses of the current stack, innermost
    /// first, skipping the capture machinery's own frames. Returns the number
    /// of frames written, at most `buf.len()`; an empty buffer must see no
    /// writes. Never fails.
    ///
    /// Must be async-signal-safe: no allocation and no locking.
    fn collect(buf: &mut [Frame]) -> usize;

    /// Best-effort symbol lookup for one address. May allocate. NOT
    /// async-signal-safe.
    fn resolve(addr: usize) -> Symbol;

    /// Batch lookup, one `Symbol` per frame, in order. Backends that pay a
    /// per-module cost (loading a symbol table, spawning a symbolizer)
    /// override this to amortize it across frames.
    fn resolve_many(frames: &[Frame]) -> Vec<Symbol> {
        frames.iter().map(|f| Self::resolve(f.address())).collect()
    }

    /// One newline-terminated human-readable line for `addr`.
    fn to_string(addr: usize) -> String {
        render_line(addr, &Self::resolve(addr))
    }

    /// Multi-line text for `frames`. Must equal the in-order concatenation of
    /// the single-address lines; the default guarantees that by sharing the
    /// line renderer with `to_string`.
    fn to_string_many(frames: &[Frame]) -> String {
        let symbols = Self::resolve_many(frames);
        let mut out = String::new();
        for (frame, symbol) in frames.iter().zip(symbols.iter()) {
            out.push_str(&render_line(frame.address(), symbol));
        }
        out
    }
}

/// Formats one frame line: the demangled name when known, the bare hex
/// address otherwise, with ` at file:line` appended when a line is known.
fn render_line(addr: usize, symbol: &Symbol) -> String {
    let mut line = if symbol.name.is_empty() {
        format!("{:#x}", addr)
    } else {
        symbol.name.clone()
    };
    if symbol.line != 0 && !symbol.file.is_empty() {
        line.push_str(&format!(" at {}:{}", symbol.file, symbol.line));
    }
    line.push('\n');
    line
}

/// No meaningful line means no meaningful file, whatever the backend found.
fn normalize(mut symbol: Symbol) -> Symbol {
    if symbol.line == 0 {
        symbol.file.clear();
    }
    symbol
}

#[inline(always)]
pub(crate) fn collect(buf: &mut [Frame]) -> usize {
    Active::collect(buf)
}

pub(crate) fn resolve(addr: usize) -> Symbol {
    normalize(Active::resolve(addr))
}

pub(crate) fn to_string(addr: usize) -> String {
    Active::to_string(addr)
}

pub(crate) fn to_string_many(frames: &[Frame]) -> String {
    Active::to_string_many(frames)
}
