#![doc = include_str!("../../../README.md")]

mod exceptions;
mod heap;
mod io;
mod runtime;
mod trace;
mod types;
mod value;
mod vm;

pub use crate::{
    exceptions::{
        BuiltinExc, EXCEPTION_TABLE_SIZE, ExcId, ExceptionRecord, ExceptionRegistry, Fault, MgrResult, RunError,
        RunResult, Unwind,
    },
    heap::{BLOCK_CAPACITY, BlockId, GcRoots, Heap, HeapData, HeapId, HeapStats, MAX_ALLOWED_EMPTY_BLOCKS},
    io::{CollectStringWriter, DiagnosticWriter, NoWriter, StderrWriter},
    runtime::Runtime,
    trace::{CodeUnit, SourceLoc, SourceTracker},
    types::{Callable, Dict, Instance, List, Set},
    value::Value,
    vm::{HandlerFilter, HandlerFrame, VmState},
};
