use std::{borrow::Cow, fmt};

use ahash::AHashMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    io::DiagnosticWriter,
    trace::SourceTracker,
    vm::{HandlerFilter, VmState},
};

/// Capacity of the exception registry.
///
/// The builtin set is far smaller; the headroom exists for embedders that
/// register their own kinds at startup.
pub const EXCEPTION_TABLE_SIZE: usize = 64;

/// Stable small-integer identifier for a registered exception kind.
///
/// IDs are assigned once at registration, are contiguous, and are never
/// reused. Handler frames filter on `ExcId`, so compiled code can embed the
/// ID directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExcId(u16);

impl ExcId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// The closed set of exception kinds registered at startup.
///
/// The string form of each variant is the name scripts and diagnostics use.
/// Fatal kinds terminate the process even when a matching handler exists;
/// recoverable kinds are eligible for handler search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum BuiltinExc {
    #[strum(serialize = "varError")]
    VarError,
    ObjHashError,
    ConstantError,
    DisassemblerError,
    CallableError,
    ObjManagerError,
    ReferenceTableError,
    StrHashError,
    DictError,
    ListError,
    SetError,
    #[strum(serialize = "GCError")]
    GcError,
    InternalError,
    ReturnCountError,
    ParameterError,
    AttributeError,
    ValueError,
    TypeError,
    ReferenceError,
}

impl BuiltinExc {
    /// Returns whether this kind always terminates, bypassing handler search.
    #[must_use]
    pub fn fatal(self) -> bool {
        !matches!(
            self,
            Self::ParameterError | Self::AttributeError | Self::ValueError | Self::TypeError | Self::ReferenceError
        )
    }
}

/// Result type alias for operations that can produce a runtime exception.
pub type RunResult<T> = Result<T, RunError>;

/// A pending exception produced by the heap, a container operation, or the
/// interpreter, awaiting propagation.
///
/// A `RunError` is data, not control flow: it travels up through `?` until
/// the dispatch loop hands it to [`crate::Runtime::raise_error`], which
/// resolves it against the handler stack and returns an [`Unwind`] outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    kind: BuiltinExc,
    message: Cow<'static, str>,
}

impl RunError {
    #[must_use]
    pub fn new(kind: BuiltinExc, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BuiltinExc {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{kind}: {message}", kind = self.kind, message = self.message)
    }
}

impl std::error::Error for RunError {}

/// Result type alias for registry and manager-internal operations.
pub type MgrResult<T> = Result<T, Fault>;

/// A manager-class internal failure: uninitialized or corrupted registry
/// state, detected at the API boundary.
///
/// Faults bypass handler search entirely; the propagation engine renders
/// them as terminal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    message: Cow<'static, str>,
}

impl Fault {
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExceptionManagerError: {message}", message = self.message)
    }
}

impl std::error::Error for Fault {}

/// One registered exception kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord {
    pub id: ExcId,
    pub name: Box<str>,
    pub fatal: bool,
}

/// Process-wide table of exception kinds.
///
/// Populated exactly once at startup with the builtin set; duplicate
/// registration, overflow, and lookup of an unknown name are all
/// manager-class faults.
#[derive(Debug, Default)]
pub struct ExceptionRegistry {
    records: Vec<ExceptionRecord>,
    by_name: AHashMap<Box<str>, ExcId>,
}

impl ExceptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the builtin exception set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in BuiltinExc::iter() {
            let name: &'static str = kind.into();
            registry
                .add_exception(name, kind.fatal())
                .expect("builtin exception set fits the registry");
        }
        registry
    }

    /// Registers a new exception kind, assigning the next contiguous ID.
    pub fn add_exception(&mut self, name: &str, fatal: bool) -> MgrResult<ExcId> {
        if self.by_name.contains_key(name) {
            return Err(Fault::new("Registering a duplicate exception"));
        }
        if self.records.len() >= EXCEPTION_TABLE_SIZE {
            return Err(Fault::new("Exception registry overflow"));
        }
        let id = ExcId(
            self.records
                .len()
                .try_into()
                .expect("registry capacity fits in u16"),
        );
        let name: Box<str> = name.into();
        self.records.push(ExceptionRecord {
            id,
            name: name.clone(),
            fatal,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Resolves a registered exception name to its ID.
    pub fn id_by_name(&self, name: &str) -> MgrResult<ExcId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Fault::new("Exception could not be found"))
    }

    /// Returns the record for a registered ID.
    pub fn record(&self, id: ExcId) -> MgrResult<&ExceptionRecord> {
        self.records
            .get(id.index())
            .ok_or_else(|| Fault::new("Exception ID out of range"))
    }

    /// Number of registered exception kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of exception propagation.
///
/// Rather than rewriting the interpreter's program counter in place, a
/// raise returns this outcome and the dispatch loop acts on it: `Resume`
/// is the non-local jump to a matched handler's saved program point,
/// `Terminate` means the diagnostic has been written and the process
/// should exit with the given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwind {
    /// Resume execution at a matched handler's recorded instruction
    /// pointer and stack depth.
    Resume { ip: usize, sp: usize, line: u32 },
    /// No handler matched, or the kind was fatal. The diagnostic has been
    /// emitted; the embedder exits with `status`.
    Terminate { status: i32 },
}

impl Unwind {
    #[must_use]
    pub fn is_resume(&self) -> bool {
        matches!(self, Self::Resume { .. })
    }
}

/// Resolves a raised exception against the interpreter's handler stack.
///
/// Fatal kinds and pre-runtime raises skip straight to the terminate path.
/// Otherwise the handler stack is scanned innermost-first; the first frame
/// that handles all kinds or filters on exactly this ID wins, its batch is
/// popped, and the engine returns the saved program point. With no match
/// the diagnostic (plus a traceback when mid-interpretation) is written
/// and the outcome is `Terminate`.
pub(crate) fn propagate<W: DiagnosticWriter>(
    registry: &ExceptionRegistry,
    tracker: &SourceTracker,
    writer: &mut W,
    vm: &mut VmState,
    id: ExcId,
    message: &str,
) -> Unwind {
    let record = match registry.record(id) {
        Ok(record) => record,
        Err(fault) => return manager_terminate(&fault, tracker, writer, Some(vm)),
    };

    if vm.is_runtime && !record.fatal {
        let matched = vm.handlers.iter().rposition(|frame| match frame.filter {
            HandlerFilter::All => true,
            HandlerFilter::Only(filter) => filter == id,
        });
        if let Some(index) = matched {
            let frame = vm.handlers[index];
            // Pop the whole batch the matched handler was pushed with.
            let batch = usize::from(frame.batch_count);
            let new_len = vm.handlers.len().saturating_sub(batch);
            vm.handlers.truncate(new_len);
            return Unwind::Resume {
                ip: frame.target_ip,
                sp: frame.target_sp,
                line: frame.target_line,
            };
        }
    }

    let prefix = if record.fatal { "Unrecoverable - " } else { "" };
    writer.write_text(&format!(
        "\n{prefix}{name}: {message}\n",
        name = record.name
    ));
    if vm.is_runtime {
        tracker.render_traceback(writer, &vm.ip_stack);
    }
    Unwind::Terminate { status: 1 }
}

/// Terminal path for manager-class faults.
///
/// There is no handler search: the fault is rendered directly, with a
/// traceback when the interpreter was mid-execution.
pub(crate) fn manager_terminate<W: DiagnosticWriter>(
    fault: &Fault,
    tracker: &SourceTracker,
    writer: &mut W,
    vm: Option<&VmState>,
) -> Unwind {
    writer.write_text(&format!("\n{fault}\n"));
    if let Some(vm) = vm
        && vm.is_runtime
    {
        tracker.render_traceback(writer, &vm.ip_stack);
    }
    Unwind::Terminate { status: 1 }
}
