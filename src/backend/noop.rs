//! The always-available fallback: captures nothing, resolves nothing.
//!
//! Selected explicitly through the `noop` feature to compile stack traces
//! out of a build, or implicitly on targets with no working strategy.

use super::{Backend, Symbol};
use crate::frame::Frame;

pub struct Noop;

impl Backend for Noop {
    fn collect(_buf: &mut [Frame]) -> usize {
        0
    }

    fn resolve(_addr: usize) -> Symbol {
        Symbol::unknown()
    }

    // Every text output is empty, not even a hex address, so a disabled
    // build leaks nothing into logs.
    fn to_string(_addr: usize) -> String {
        String::new()
    }

    fn to_string_many(_frames: &[Frame]) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_always_returns_zero() {
        let mut buf = [Frame::empty(); 8];
        assert_eq!(Noop::collect(&mut buf), 0);
        assert!(buf.iter().all(|f| f.is_empty()));
    }

    #[test]
    fn resolve_is_unknown_for_any_address() {
        for &addr in &[0usize, 1, 0xdead_beef] {
            let symbol = Noop::resolve(addr);
            assert_eq!(symbol.name, "");
            assert_eq!(symbol.file, "");
            assert_eq!(symbol.line, 0);
        }
    }

    #[test]
    fn text_forms_are_empty() {
        assert_eq!(Noop::to_string(0xdead_beef), "");
        let frames = [Frame::new(0x1000), Frame::new(0x2000)];
        assert_eq!(Noop::to_string_many(&frames), "");
        // The batch law still holds: both sides are empty.
        let concat: String = frames
            .iter()
            .map(|f| Noop::to_string(f.address()))
            .collect();
        assert_eq!(Noop::to_string_many(&frames), concat);
    }
}
