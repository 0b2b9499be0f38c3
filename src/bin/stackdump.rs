//! Prints the call stack of its own main thread. A smoke test for whichever
//! backend the build selected: capture first, symbolize afterwards.

use stackshot::Frame;

#[inline(never)]
fn capture_and_print() {
    let mut buf = [Frame::empty(); 128];
    let count = stackshot::collect(&mut buf);
    eprintln!("captured {} frames", count);
    print!("{}", stackshot::format_frames(&buf[..count]));
}

#[inline(never)]
fn nested() {
    capture_and_print();
}

fn main() {
    nested();
}
