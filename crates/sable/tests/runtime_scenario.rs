//! End-to-end scenario driving the runtime the way the interpreter does:
//! allocate under a try-scope, fail a container operation, and resume at
//! the recorded handler instead of terminating.

use pretty_assertions::assert_eq;
use sable::{
    BuiltinExc, CodeUnit, CollectStringWriter, HandlerFilter, HandlerFrame, HeapData, List, RunError, Runtime,
    SourceLoc, Unwind, Value, VmState,
};

#[test]
fn type_error_in_try_scope_resumes_at_handler() {
    let mut runtime = Runtime::with_writer(CollectStringWriter::new());
    runtime.add_builtin_exceptions().unwrap();
    runtime.attach_source("list(1,2,3);\nlist.get(\"x\");\n", "main.sbl");
    runtime.attach_units(vec![CodeUnit::new(
        0,
        vec![SourceLoc::new(0, 0, 0), SourceLoc::new(1, 0, 0), SourceLoc::new(1, 9, 0)],
    )]);

    let mut vm = VmState::new(1);
    vm.is_runtime = true;

    // Enter the surrounding try-scope: on TypeError resume at ip 7 with an
    // empty operand stack.
    let type_error = runtime.exception_id("TypeError").unwrap();
    vm.push_handler_batch(vec![HandlerFrame::new(7, 0, HandlerFilter::Only(type_error), 3)]);

    // list(1,2,3)
    let list = runtime
        .new_object(
            HeapData::List(List::from_values(vec![
                Value::Num(1.0),
                Value::Num(2.0),
                Value::Num(3.0),
            ])),
            &vm,
        )
        .unwrap();
    vm.stack.push(Value::Ref(list));
    vm.ip_stack.push(3);

    // list.get("x"): a string index is a type error the scope handles.
    let error = RunError::new(BuiltinExc::TypeError, "List index must be a number");
    let unwind = runtime.raise_error(&mut vm, &error);
    assert_eq!(unwind, Unwind::Resume { ip: 7, sp: 0, line: 3 });

    // The dispatch loop acts on the outcome: restore the recorded stack
    // depth and continue at the handler.
    let Unwind::Resume { sp, .. } = unwind else {
        panic!("expected resume");
    };
    vm.stack.truncate(sp);
    assert_eq!(vm.stack.len(), 0);
    assert!(vm.handlers.is_empty());

    // Nothing was printed and the process keeps running.
    assert_eq!(runtime.writer().output(), "");

    // The heap stays coherent after the non-local jump: the list is now
    // garbage and one collection reclaims it.
    let removed = runtime.collect_garbage(&vm).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(runtime.heap_stats().live_objects, 0);
}

#[test]
fn same_raise_without_handler_terminates_with_traceback() {
    let mut runtime = Runtime::with_writer(CollectStringWriter::new());
    runtime.add_builtin_exceptions().unwrap();
    runtime.attach_source("list(1,2,3);\nlist.get(\"x\");\n", "main.sbl");
    runtime.attach_units(vec![CodeUnit::new(
        0,
        vec![SourceLoc::new(0, 0, 0), SourceLoc::new(1, 0, 0), SourceLoc::new(1, 9, 0)],
    )]);

    let mut vm = VmState::new(1);
    vm.is_runtime = true;
    vm.ip_stack.push(3);

    let error = RunError::new(BuiltinExc::TypeError, "List index must be a number");
    let unwind = runtime.raise_error(&mut vm, &error);
    assert_eq!(unwind, Unwind::Terminate { status: 1 });
    assert_eq!(
        runtime.writer().output(),
        concat!(
            "\nTypeError: List index must be a number\n",
            "Runtime traceback:\n",
            "\nCall Frame [0]:\n",
            "list(1,2,3);\n",
            "list.get(\"x\");\n",
            "         ^\n",
            "         In \"main.sbl\": [line: 2, index 10]\n",
        )
    );
}

#[test]
fn allocation_pressure_inside_a_try_scope_stays_bounded() {
    let mut runtime = Runtime::with_writer(CollectStringWriter::new());
    runtime.add_builtin_exceptions().unwrap();

    let mut vm = VmState::new(0);
    vm.is_runtime = true;

    // Churn through far more objects than one block holds, keeping only a
    // small window rooted. Exhaustion-triggered collections keep the heap
    // from growing past the reserve.
    for i in 0..1_000 {
        let id = runtime
            .new_object(HeapData::Str(format!("tmp-{i}").into()), &vm)
            .unwrap();
        vm.stack.push(Value::Ref(id));
        if vm.stack.len() > 8 {
            vm.stack.remove(0);
        }
    }

    let stats = runtime.heap_stats();
    assert!(stats.blocks <= 3, "heap grew without bound: {stats}");
    assert_eq!(stats.free_slots + stats.live_objects, stats.total_slots);

    // The rooted window survived every collection.
    for value in &vm.stack {
        let id = value.heap_id().unwrap();
        assert!(matches!(runtime.heap().get(id), HeapData::Str(_)));
    }
}
