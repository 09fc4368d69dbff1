//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors. `.unwrap()` and `.expect(`
//! are allowed only in test code.

use architectural_enforcement::{report, scan, PRODUCTION_DIRS};

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = scan(&PRODUCTION_DIRS, |_, lines, idx| {
        let code = &lines[idx].1;
        code.contains(".unwrap()") || code.contains(".expect(")
    });

    report("unwrap()/expect() in production code", &violations);
}
