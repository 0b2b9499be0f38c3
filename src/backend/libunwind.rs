//! Library-based strategy: everything through linked libraries, no helper
//! processes. Opt-in via the `libunwind` feature, Linux only.
//!
//! Capture steps a local libunwind cursor over the current context, which is
//! allocation-free and safe under a signal handler. Symbolization asks
//! `dladdr(3)` for the nearest dynamic symbol and demangles it. Dynamic
//! symbol tables carry no line information, so `source_line` is always 0
//! here; builds that need file/line should stay on the default addr2line
//! strategy.

use std::ffi::CStr;
use std::mem;
use std::mem::MaybeUninit;
use std::os::raw::c_void;

use rustc_demangle::demangle;
use unwind_sys::{
    unw_context_t, unw_cursor_t, unw_get_reg, unw_init_local, unw_step, unw_word_t, UNW_REG_IP,
};

use super::{Backend, Symbol};
use crate::frame::Frame;

pub struct Libunwind;

impl Backend for Libunwind {
    #[inline(always)]
    fn collect(buf: &mut [Frame]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        unsafe {
            let mut context = MaybeUninit::<libc::ucontext_t>::zeroed();
            if libc::getcontext(context.as_mut_ptr()) != 0 {
                return 0;
            }
            // On Linux libunwind's unw_context_t is ucontext_t.
            let context = context.as_mut_ptr() as *mut unw_context_t;
            let mut cursor = MaybeUninit::<unw_cursor_t>::uninit();
            if unw_init_local(cursor.as_mut_ptr(), context) < 0 {
                return 0;
            }

            let mut count = 0;
            while count < buf.len() {
                // The cursor starts on the collect frame itself; stepping
                // before reading skips it, so buf[0] is the caller.
                let step = unw_step(cursor.as_mut_ptr());
                if step <= 0 {
                    break;
                }
                let mut ip: unw_word_t = 0;
                if unw_get_reg(cursor.as_mut_ptr(), UNW_REG_IP, &mut ip) < 0 {
                    break;
                }
                if ip == 0 {
                    break;
                }
                buf[count] = Frame::new(ip as usize);
                count += 1;
            }
            count
        }
    }

    fn resolve(addr: usize) -> Symbol {
        let mut info: libc::Dl_info = unsafe { mem::zeroed() };
        let found = unsafe { libc::dladdr(addr as *const c_void, &mut info) };
        if found == 0 || info.dli_sname.is_null() {
            return Symbol::unknown();
        }
        let raw = unsafe { CStr::from_ptr(info.dli_sname) };
        Symbol {
            name: format!("{:#}", demangle(&raw.to_string_lossy())),
            file: String::new(),
            line: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_walks_the_test_stack() {
        let mut buf = [Frame::empty(); 64];
        let n = Libunwind::collect(&mut buf);
        assert!(n > 0);
        assert!(n <= buf.len());
        assert!(!buf[0].is_empty());
    }

    #[test]
    fn unmapped_address_is_unknown() {
        let symbol = Libunwind::resolve(0x10);
        assert_eq!(symbol.name, "");
        assert_eq!(symbol.line, 0);
    }

    #[test]
    fn never_reports_a_source_line() {
        let symbol = Libunwind::resolve(Libunwind::collect as usize);
        assert_eq!(symbol.line, 0);
        assert_eq!(symbol.file, "");
    }
}
