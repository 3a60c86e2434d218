//! Golden tests for diagnostic rendering: source context, carets,
//! tracebacks, and pre-runtime errors.

use pretty_assertions::assert_eq;
use sable::{CodeUnit, CollectStringWriter, Runtime, SourceLoc, Unwind, VmState};

fn runtime_with_source() -> Runtime<CollectStringWriter> {
    let mut runtime = Runtime::with_writer(CollectStringWriter::new());
    runtime.add_builtin_exceptions().unwrap();
    runtime.attach_source("one\ntwo\nthree\nfour\n", "main.sbl");
    runtime.attach_units(vec![CodeUnit::new(
        100,
        vec![
            SourceLoc::new(0, 0, 0),
            SourceLoc::new(1, 1, 0),
            SourceLoc::new(3, 2, 0),
        ],
    )]);
    runtime
}

#[test]
fn unmatched_raise_prints_full_traceback() {
    let mut runtime = runtime_with_source();
    let mut vm = VmState::new(0);
    vm.is_runtime = true;
    // Innermost frame last; saved pointers sit one past the executing
    // instruction.
    vm.ip_stack = vec![101, 103];

    let unwind = runtime.raise_by_name(&mut vm, "TypeError", "oops");
    assert_eq!(unwind, Unwind::Terminate { status: 1 });
    assert_eq!(
        runtime.writer().output(),
        concat!(
            "\nTypeError: oops\n",
            "Runtime traceback:\n",
            "\nCall Frame [1]:\n",
            "two\nthree\nfour\n",
            "  ^\n",
            "  In \"main.sbl\": [line: 4, index 3]\n",
            "\nCall Frame [0]:\n",
            "one\n",
            "^\n",
            "In \"main.sbl\": [line: 1, index 1]\n",
        )
    );
}

#[test]
fn frame_outside_every_unit_prints_fallback() {
    let mut runtime = runtime_with_source();
    let mut vm = VmState::new(0);
    vm.is_runtime = true;
    vm.ip_stack = vec![999];

    runtime.raise_by_name(&mut vm, "TypeError", "oops");
    assert_eq!(
        runtime.writer().output(),
        concat!(
            "\nTypeError: oops\n",
            "Runtime traceback:\n",
            "\nCall Frame [0]:\n",
            "Instruction pointer not found in any code unit\n",
        )
    );
}

#[test]
fn first_line_has_no_preceding_context() {
    let mut runtime = runtime_with_source();
    let unwind = runtime.parsing_error(0, 2, 0, "Unexpected token");
    assert_eq!(unwind, Unwind::Terminate { status: 1 });
    assert_eq!(
        runtime.writer().output(),
        concat!(
            "\nParsingError: Unexpected token\n",
            "one\n",
            "  ^\n",
            "  In \"main.sbl\": [line: 1, index 3]\n",
        )
    );
}

#[test]
fn compilation_error_renders_context_lines() {
    let mut runtime = runtime_with_source();
    runtime.compilation_error(3, 0, 0, "Unknown variable");
    assert_eq!(
        runtime.writer().output(),
        concat!(
            "\nCompilationError: Unknown variable\n",
            "two\nthree\nfour\n",
            "^\n",
            "In \"main.sbl\": [line: 4, index 1]\n",
        )
    );
}

#[test]
fn pre_runtime_error_with_missing_source_reports_it() {
    let mut runtime = Runtime::with_writer(CollectStringWriter::new());
    runtime.add_builtin_exceptions().unwrap();
    runtime.parsing_error(0, 0, 0, "Unexpected token");
    assert_eq!(
        runtime.writer().output(),
        "\nParsingError: Unexpected token\nSourceError: source never attached\n"
    );
}
