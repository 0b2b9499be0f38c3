//! Captures a stack from inside a real signal handler and checks that the
//! capture path performed no heap allocation. The handler writes into a
//! static buffer and communicates through atomics only.
#![cfg(target_os = "linux")]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use stackshot::Frame;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

// Same trick as a semaphore shared with a signal handler: interior
// mutability behind a type we assert is Sync, touched only while the
// handler owns it.
struct Scratch(UnsafeCell<[Frame; 64]>);

unsafe impl Sync for Scratch {}

static SCRATCH: Scratch = Scratch(UnsafeCell::new([Frame::empty(); 64]));
static CAPTURED: AtomicUsize = AtomicUsize::new(0);
static HANDLER_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static HANDLER_RAN: AtomicBool = AtomicBool::new(false);

extern "C" fn capture_in_handler(
    sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    _ctx: *mut libc::c_void,
) {
    assert_eq!(sig, libc::SIGPROF);
    let before = ALLOCATIONS.load(Ordering::SeqCst);
    let buf = unsafe { &mut *SCRATCH.0.get() };
    let count = stackshot::collect(buf);
    let after = ALLOCATIONS.load(Ordering::SeqCst);

    CAPTURED.store(count, Ordering::SeqCst);
    HANDLER_ALLOCATIONS.store(after - before, Ordering::SeqCst);
    HANDLER_RAN.store(true, Ordering::SeqCst);
}

#[test]
fn capture_from_signal_handler_without_allocating() {
    // Warm up the unwinder outside the handler; glibc's backtrace loads
    // libgcc on first use.
    let mut warmup = [Frame::empty(); 8];
    stackshot::collect(&mut warmup);

    let handler = SigHandler::SigAction(capture_in_handler);
    let action = SigAction::new(handler, SaFlags::SA_SIGINFO, SigSet::empty());
    unsafe {
        sigaction(Signal::SIGPROF, &action).expect("signal handler set");
        libc::raise(libc::SIGPROF);
    }

    assert!(HANDLER_RAN.load(Ordering::SeqCst));
    let count = CAPTURED.load(Ordering::SeqCst);
    assert!(count <= 64);
    assert_eq!(HANDLER_ALLOCATIONS.load(Ordering::SeqCst), 0);

    // The captured frames symbolize fine from a normal context.
    let frames = unsafe { &*SCRATCH.0.get() };
    let text = stackshot::format_frames(&frames[..count]);
    assert_eq!(text.lines().count(), count);
}
