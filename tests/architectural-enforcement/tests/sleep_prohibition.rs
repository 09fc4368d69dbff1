//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT block a thread with `std::thread::sleep`.
//! Async sleeps are allowed only for the layout settle fallback, where the
//! host gives no layout-settled signal to wait on.

use std::path::Path;

use architectural_enforcement::{report, scan, PRODUCTION_DIRS};

#[test]
fn test_no_blocking_sleep() {
    let violations = scan(&PRODUCTION_DIRS, |_, lines, idx| {
        lines[idx].1.contains("thread::sleep(")
    });

    report("Blocking sleep in production code", &violations);
}

#[test]
fn test_async_sleep_only_for_settle_fallback() {
    let violations = scan(&PRODUCTION_DIRS, |path, lines, idx| {
        let code = &lines[idx].1;
        (code.contains("time::sleep(") || code.contains(".sleep("))
            && !code.contains("thread::sleep(")
            && !is_settle_context(path, lines, idx)
    });

    report("Async sleep outside the settle fallback", &violations);
}

/// Sleep sits inside a function whose name mentions settling
fn is_settle_context(_path: &Path, lines: &[(usize, String)], idx: usize) -> bool {
    lines[..idx]
        .iter()
        .rev()
        .find(|(_, code)| code.contains("fn "))
        .is_some_and(|(_, code)| code.contains("settle"))
}
