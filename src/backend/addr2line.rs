//! Offline-symbolizer strategy, the Unix default.
//!
//! Capture walks the stack with the platform `backtrace(3)` unwinder, which
//! needs no allocation and no symbol tables. Symbolization maps each address
//! to its module with `dladdr(3)`, then spawns one `addr2line -f -e <module>`
//! per module and parses the name/file/line pairs it prints. Batch lookups
//! group addresses by module first, so a ten-module stack costs ten resolver
//! runs rather than one per frame.
//!
//! When `addr2line` is missing or its output cannot be matched up, the
//! dynamic-symbol name from `dladdr` is used instead, and failing that the
//! frame stays unresolved. Either way the failure is logged and swallowed;
//! symbolization never brings down the caller.

use std::collections::HashMap;
use std::ffi::{CStr, OsStr};
use std::io;
use std::mem;
use std::os::raw::{c_int, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use log::debug;
use rustc_demangle::demangle;
use thiserror::Error;

use super::{Backend, Symbol};
use crate::frame::Frame;

extern "C" {
    // From execinfo.h. Not bound by the libc crate on all targets, so we
    // declare it ourselves.
    fn backtrace(buf: *mut *mut c_void, size: c_int) -> c_int;
}

pub struct Addr2Line;

impl Backend for Addr2Line {
    /// Note that glibc's `backtrace` loads libgcc on its very first call.
    /// Programs that capture from signal handlers should collect one throwaway
    /// trace at startup to get that out of the way.
    #[inline(always)]
    fn collect(buf: &mut [Frame]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let count = unsafe { backtrace(buf.as_mut_ptr() as *mut *mut c_void, buf.len() as c_int) };
        if count <= 0 {
            return 0;
        }
        let count = count as usize;
        // buf[0] is the collect frame itself; shift it out so the caller's
        // frame comes first.
        buf.copy_within(1..count, 0);
        buf[count - 1] = Frame::empty();
        count - 1
    }

    fn resolve(addr: usize) -> Symbol {
        Self::resolve_many(&[Frame::new(addr)])
            .pop()
            .unwrap_or_else(Symbol::unknown)
    }

    fn resolve_many(frames: &[Frame]) -> Vec<Symbol> {
        let mut symbols = vec![Symbol::unknown(); frames.len()];

        // Group frames by module so each module's symbolizer runs once per
        // batch. The grouping also doubles as the per-call cache: repeated
        // addresses land in the same run.
        let mut by_module: HashMap<PathBuf, Vec<(usize, usize)>> = HashMap::new();
        for (index, frame) in frames.iter().enumerate() {
            if let Some(location) = ModuleLocation::of(frame.address()) {
                if let Some(name) = location.dynamic_name {
                    symbols[index].name = name;
                }
                by_module
                    .entry(location.path)
                    .or_insert_with(Vec::new)
                    .push((index, location.rva));
            }
        }

        for (module, entries) in by_module {
            let rvas: Vec<usize> = entries.iter().map(|&(_, rva)| rva).collect();
            match run_addr2line(&module, &rvas) {
                Ok(resolved) => {
                    for (&(index, _), symbol) in entries.iter().zip(resolved) {
                        if !symbol.name.is_empty() {
                            symbols[index].name = symbol.name;
                        }
                        symbols[index].file = symbol.file;
                        symbols[index].line = symbol.line;
                    }
                }
                Err(err) => {
                    // Keep whatever dladdr gave us.
                    debug!("symbolization of {} failed: {}", module.display(), err);
                }
            }
        }

        symbols
    }
}

#[derive(Debug, Error)]
enum ResolveError {
    #[error("failed to run addr2line: {0}")]
    Spawn(#[from] io::Error),
    #[error("addr2line exited with {0}")]
    Failed(ExitStatus),
    #[error("addr2line printed fewer records than addresses requested")]
    Truncated,
}

/// Which loaded module covers an address, per `dladdr(3)`.
struct ModuleLocation {
    path: PathBuf,
    /// Address relative to the module's load base, which is what on-disk
    /// debug info is keyed by.
    rva: usize,
    /// Nearest dynamic symbol, if the module exports one. Fallback only;
    /// most Rust code is not in the dynamic symbol table.
    dynamic_name: Option<String>,
}

impl ModuleLocation {
    fn of(addr: usize) -> Option<ModuleLocation> {
        let mut info: libc::Dl_info = unsafe { mem::zeroed() };
        let found = unsafe { libc::dladdr(addr as *const c_void, &mut info) };
        if found == 0 || info.dli_fname.is_null() {
            return None;
        }
        let path = unsafe { CStr::from_ptr(info.dli_fname) };
        let dynamic_name = if info.dli_sname.is_null() {
            None
        } else {
            let raw = unsafe { CStr::from_ptr(info.dli_sname) };
            Some(format!("{:#}", demangle(&raw.to_string_lossy())))
        };
        Some(ModuleLocation {
            path: PathBuf::from(OsStr::from_bytes(path.to_bytes())),
            rva: addr - info.dli_fbase as usize,
            dynamic_name,
        })
    }
}

/// Runs `addr2line -f -e <module>` over `rvas` and parses one symbol per
/// address. Output comes in pairs of lines: mangled name, then `file:line`.
fn run_addr2line(module: &Path, rvas: &[usize]) -> Result<Vec<Symbol>, ResolveError> {
    let mut command = Command::new("addr2line");
    command.arg("-f").arg("-e").arg(module);
    for rva in rvas {
        command.arg(format!("{:#x}", rva));
    }

    let output = command.output()?;
    if !output.status.success() {
        return Err(ResolveError::Failed(output.status));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut lines = text.lines();
    let mut symbols = Vec::with_capacity(rvas.len());
    for _ in rvas {
        let name = lines.next().ok_or(ResolveError::Truncated)?;
        let location = lines.next().ok_or(ResolveError::Truncated)?;
        let (file, line) = parse_location(location);
        symbols.push(Symbol {
            name: parse_name(name),
            file,
            line,
        });
    }
    Ok(symbols)
}

fn parse_name(raw: &str) -> String {
    if raw.is_empty() || raw == "??" {
        String::new()
    } else {
        format!("{:#}", demangle(raw))
    }
}

/// Parses addr2line's `file:line` form. `??:0`, `??:?` and friends all mean
/// unknown. Newer binutils append ` (discriminator N)`, which we ignore.
fn parse_location(raw: &str) -> (String, u32) {
    let raw = match raw.find(" (") {
        Some(pos) => &raw[..pos],
        None => raw,
    };
    let (file, line) = match raw.rfind(':') {
        Some(pos) => (&raw[..pos], &raw[pos + 1..]),
        None => return (String::new(), 0),
    };
    if file.is_empty() || file == "??" {
        return (String::new(), 0);
    }
    match line.parse::<u32>() {
        Ok(line) if line > 0 => (file.to_string(), line),
        _ => (String::new(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_location_known() {
        assert_eq!(parse_location("/src/a.c:10"), ("/src/a.c".to_string(), 10));
    }

    #[test]
    fn parse_location_unknown() {
        assert_eq!(parse_location("??:0"), (String::new(), 0));
        assert_eq!(parse_location("??:?"), (String::new(), 0));
        assert_eq!(parse_location(""), (String::new(), 0));
    }

    #[test]
    fn parse_location_discriminator() {
        assert_eq!(
            parse_location("/src/a.c:10 (discriminator 3)"),
            ("/src/a.c".to_string(), 10)
        );
    }

    #[test]
    fn parse_location_zero_line_means_no_file() {
        assert_eq!(parse_location("/src/a.c:0"), (String::new(), 0));
    }

    #[test]
    fn parse_name_unknown() {
        assert_eq!(parse_name("??"), "");
        assert_eq!(parse_name(""), "");
    }

    #[test]
    fn parse_name_demangles() {
        assert_eq!(parse_name("_ZN3foo3barE"), "foo::bar");
    }

    #[test]
    fn collect_returns_caller_frames() {
        let mut buf = [Frame::empty(); 64];
        let n = Addr2Line::collect(&mut buf);
        assert!(n > 0);
        assert!(n <= buf.len());
        assert!(!buf[0].is_empty());
    }

    #[test]
    fn module_of_own_function() {
        let location = ModuleLocation::of(collect_returns_caller_frames as usize)
            .expect("dladdr should know the test binary");
        assert!(!location.path.as_os_str().is_empty());
        assert!(location.rva <= collect_returns_caller_frames as usize);
    }

    #[test]
    fn unmapped_address_renders_as_hex() {
        // Page zero is never mapped, so dladdr has nothing to say.
        let line = Addr2Line::to_string(0x10);
        assert!(line.starts_with("0x10"));
        assert!(line.ends_with('\n'));
    }
}
