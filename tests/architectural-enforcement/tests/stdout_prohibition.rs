//! Integration Test: Stdout Prohibition
//!
//! **Policy**: The core library reports through `tracing` only. Printing to
//! stdout or stderr is left to binaries.

use architectural_enforcement::{report, scan};

#[test]
fn test_no_print_in_core_library() {
    let violations = scan(&["conductor/core/src"], |_, lines, idx| {
        let code = &lines[idx].1;
        ["println!", "eprintln!", "print!(", "eprint!(", "dbg!("]
            .iter()
            .any(|needle| code.contains(needle))
    });

    report("Printing from the core library", &violations);
}
