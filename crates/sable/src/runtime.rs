use crate::{
    exceptions::{
        self, ExcId, ExceptionRegistry, Fault, MgrResult, RunError, RunResult, Unwind,
    },
    heap::{Heap, HeapData, HeapId, HeapStats},
    io::{DiagnosticWriter, StderrWriter},
    trace::{CodeUnit, SourceTracker},
    vm::VmState,
};

/// The lifecycle-scoped runtime context.
///
/// Bundles the heap, the exception registry, the source tracker, and the
/// diagnostic writer into one explicitly threaded structure instead of
/// process-wide globals, so the whole subsystem is independently testable
/// and resettable. The interpreter owns its [`VmState`] separately and
/// passes it in wherever roots or handler stacks are consulted.
#[derive(Debug)]
pub struct Runtime<W: DiagnosticWriter = StderrWriter> {
    heap: Heap,
    /// `None` until `add_builtin_exceptions` runs; raising before that is
    /// a manager fault.
    exceptions: Option<ExceptionRegistry>,
    tracker: SourceTracker,
    writer: W,
}

impl Runtime<StderrWriter> {
    /// Creates a runtime writing diagnostics to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(StderrWriter)
    }
}

impl Default for Runtime<StderrWriter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: DiagnosticWriter> Runtime<W> {
    /// Creates a runtime with a custom diagnostic writer.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            heap: Heap::new(),
            exceptions: None,
            tracker: SourceTracker::new(),
            writer,
        }
    }

    /// One-time registration of the builtin exception set.
    ///
    /// Must precede any raise. Running it twice is a manager fault, the
    /// same class as registering a duplicate kind.
    pub fn add_builtin_exceptions(&mut self) -> MgrResult<()> {
        if self.exceptions.is_some() {
            return Err(Fault::new("Registering a duplicate exception"));
        }
        self.exceptions = Some(ExceptionRegistry::with_builtins());
        Ok(())
    }

    fn registry(&self) -> MgrResult<&ExceptionRegistry> {
        self.exceptions
            .as_ref()
            .ok_or_else(|| Fault::new("Uninitiated exception registry"))
    }

    /// Registers an embedder-defined exception kind.
    pub fn add_exception(&mut self, name: &str, fatal: bool) -> MgrResult<ExcId> {
        self.exceptions
            .as_mut()
            .ok_or_else(|| Fault::new("Uninitiated exception registry"))?
            .add_exception(name, fatal)
    }

    /// Resolves a registered exception name to its stable ID.
    pub fn exception_id(&self, name: &str) -> MgrResult<ExcId> {
        self.registry()?.id_by_name(name)
    }

    /// Number of registered exception kinds.
    pub fn exception_count(&self) -> MgrResult<usize> {
        Ok(self.registry()?.len())
    }

    /// Registers a source text and its display name for diagnostics.
    pub fn attach_source(&mut self, text: impl Into<String>, name: impl Into<String>) {
        self.tracker.attach_source(text, name);
    }

    /// Registers the compiled units' source tables for tracebacks.
    pub fn attach_units(&mut self, units: Vec<CodeUnit>) {
        self.tracker.attach_units(units);
    }

    /// Allocates a heap object, collecting against the interpreter's
    /// current roots when the heap is exhausted.
    pub fn new_object(&mut self, data: HeapData, vm: &VmState) -> RunResult<HeapId> {
        self.heap.allocate(data, vm.gc_roots())
    }

    /// Allocates a permanent object (constants created by the front end).
    pub fn new_const_object(&mut self, data: HeapData) -> RunResult<HeapId> {
        self.heap.allocate_const(data)
    }

    /// Runs a full collection cycle against the interpreter's roots.
    pub fn collect_garbage(&mut self, vm: &VmState) -> RunResult<usize> {
        self.heap.collect_garbage(vm.gc_roots())
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Raises an exception by registered ID. The sole exception entry
    /// point together with [`Runtime::raise_by_name`].
    pub fn raise_by_id(&mut self, vm: &mut VmState, id: ExcId, message: &str) -> Unwind {
        let Self {
            exceptions: registry,
            tracker,
            writer,
            ..
        } = self;
        match registry.as_ref() {
            Some(registry) => exceptions::propagate(registry, tracker, writer, vm, id, message),
            None => {
                let fault = Fault::new("Uninitiated exception registry");
                exceptions::manager_terminate(&fault, tracker, writer, Some(vm))
            }
        }
    }

    /// Raises an exception by registered name.
    pub fn raise_by_name(&mut self, vm: &mut VmState, name: &str, message: &str) -> Unwind {
        let id = match self.registry().and_then(|registry| registry.id_by_name(name)) {
            Ok(id) => id,
            Err(fault) => {
                return exceptions::manager_terminate(&fault, &self.tracker, &mut self.writer, Some(vm));
            }
        };
        self.raise_by_id(vm, id, message)
    }

    /// Propagates a pending [`RunError`] produced by the heap or a
    /// container operation.
    pub fn raise_error(&mut self, vm: &mut VmState, error: &RunError) -> Unwind {
        let name: &'static str = error.kind().into();
        self.raise_by_name(vm, name, error.message())
    }

    /// Terminal path for a manager fault surfaced outside a raise.
    pub fn report_fault(&mut self, vm: Option<&VmState>, fault: &Fault) -> Unwind {
        exceptions::manager_terminate(fault, &self.tracker, &mut self.writer, vm)
    }

    /// Pre-runtime parse error: prints the message and source context and
    /// terminates. No handler search; no interpreter stack exists yet.
    pub fn parsing_error(&mut self, line: u32, col: u32, source: u16, message: &str) -> Unwind {
        self.pre_runtime_error("ParsingError", line, col, source, message)
    }

    /// Pre-runtime compilation error; same shape as [`Runtime::parsing_error`].
    pub fn compilation_error(&mut self, line: u32, col: u32, source: u16, message: &str) -> Unwind {
        self.pre_runtime_error("CompilationError", line, col, source, message)
    }

    fn pre_runtime_error(&mut self, label: &str, line: u32, col: u32, source: u16, message: &str) -> Unwind {
        self.writer.write_text(&format!("\n{label}: {message}\n"));
        self.tracker.render_source_location(&mut self.writer, line, col, source);
        Unwind::Terminate { status: 1 }
    }

    /// Access to the diagnostic writer (tests read collected output here).
    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}
