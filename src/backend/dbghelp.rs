//! OS debug-engine strategy, the Windows default.
//!
//! Capture uses `RtlCaptureStackBackTrace`, which walks the stack from unwind
//! metadata without touching the heap. Symbolization goes through the dbghelp
//! symbol engine (`SymFromAddrW` / `SymGetLineFromAddrW64`). dbghelp is not
//! thread-safe, so every symbol query holds a process-wide lock; capture does
//! not, and stays signal-safe.

use std::mem;
use std::ptr;
use std::slice;
use std::sync::{Mutex, Once};

use winapi::shared::minwindef::{DWORD, TRUE};
use winapi::um::dbghelp::{
    SymFromAddrW, SymGetLineFromAddrW64, SymInitializeW, SymSetOptions, IMAGEHLP_LINEW64,
    SYMBOL_INFOW, SYMOPT_DEFERRED_LOADS, SYMOPT_UNDNAME,
};
use winapi::um::processthreadsapi::GetCurrentProcess;
use winapi::um::winnt::RtlCaptureStackBackTrace;

use super::{Backend, Symbol};
use crate::frame::Frame;

const NAME_CAPACITY: usize = 1024;

// SYMBOL_INFOW ends in a one-element name array; dbghelp writes past it into
// whatever the caller reserved.
#[repr(C)]
struct SymbolBuffer {
    info: SYMBOL_INFOW,
    name_tail: [u16; NAME_CAPACITY],
}

static ENGINE_LOCK: Mutex<()> = Mutex::new(());
static ENGINE_INIT: Once = Once::new();

/// Initializes the symbol engine once per process. Caller must hold
/// `ENGINE_LOCK`.
fn ensure_initialized() {
    ENGINE_INIT.call_once(|| unsafe {
        SymSetOptions(SYMOPT_UNDNAME | SYMOPT_DEFERRED_LOADS);
        if SymInitializeW(GetCurrentProcess(), ptr::null(), TRUE) != TRUE {
            log::warn!("SymInitializeW failed; symbolization will be empty");
        }
    });
}

fn wide_to_string(wide: &[u16]) -> String {
    String::from_utf16_lossy(wide)
}

pub struct DbgHelp;

impl Backend for DbgHelp {
    #[inline(always)]
    fn collect(buf: &mut [Frame]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        // Skip one frame: the collect entry point itself.
        let count = unsafe {
            RtlCaptureStackBackTrace(
                1,
                buf.len() as DWORD,
                buf.as_mut_ptr() as *mut *mut winapi::ctypes::c_void,
                ptr::null_mut(),
            )
        };
        count as usize
    }

    fn resolve(addr: usize) -> Symbol {
        let _guard = match ENGINE_LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ensure_initialized();

        let mut symbol = Symbol::unknown();
        unsafe {
            let process = GetCurrentProcess();

            let mut buffer: SymbolBuffer = mem::zeroed();
            buffer.info.SizeOfStruct = mem::size_of::<SYMBOL_INFOW>() as DWORD;
            buffer.info.MaxNameLen = NAME_CAPACITY as DWORD;
            let mut displacement = 0u64;
            if SymFromAddrW(process, addr as u64, &mut displacement, &mut buffer.info) == TRUE {
                let len = buffer.info.NameLen as usize;
                let name = slice::from_raw_parts(buffer.info.Name.as_ptr(), len.min(NAME_CAPACITY));
                symbol.name = wide_to_string(name);
            }

            let mut line_info: IMAGEHLP_LINEW64 = mem::zeroed();
            line_info.SizeOfStruct = mem::size_of::<IMAGEHLP_LINEW64>() as DWORD;
            let mut line_displacement: DWORD = 0;
            if SymGetLineFromAddrW64(process, addr as u64, &mut line_displacement, &mut line_info)
                == TRUE
                && !line_info.FileName.is_null()
            {
                let mut len = 0;
                while *line_info.FileName.add(len) != 0 {
                    len += 1;
                }
                symbol.file = wide_to_string(slice::from_raw_parts(line_info.FileName, len));
                symbol.line = line_info.LineNumber;
            }
        }
        symbol
    }
}
