use crate::{exceptions::ExcId, heap::GcRoots, value::Value};

/// What a try-scope's handler frame will catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFilter {
    /// Catch-all handler.
    All,
    /// Handler filtering on exactly one exception kind.
    Only(ExcId),
}

/// One active try-scope record on the interpreter's handler stack.
///
/// Pushed on scope entry and popped either on normal scope exit or, as a
/// batch, when the propagation engine matches a frame. The recorded target
/// is the program point execution resumes at after a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFrame {
    /// Instruction address execution resumes at on match.
    pub target_ip: usize,
    /// Operand stack depth to restore on match.
    pub target_sp: usize,
    pub filter: HandlerFilter,
    /// Source line of the handler, recorded for the interpreter's benefit.
    pub target_line: u32,
    /// Number of frames pushed together with this one; the whole batch is
    /// popped atomically on match. Never exceeds the number of frames
    /// pushed since the owning try-scope began.
    pub batch_count: u8,
}

impl HandlerFrame {
    #[must_use]
    pub fn new(target_ip: usize, target_sp: usize, filter: HandlerFilter, target_line: u32) -> Self {
        Self {
            target_ip,
            target_sp,
            filter,
            target_line,
            batch_count: 1,
        }
    }
}

/// The interpreter state this core consumes.
///
/// The operand stack and global slots are the collector's root set; the
/// handler stack and instruction-pointer call stack feed the propagation
/// engine and traceback rendering. The interpreter mutates all four; this
/// core only reads them, except for the pop-on-match step during
/// propagation.
#[derive(Debug, Default)]
pub struct VmState {
    /// Operand stack; the live range is the whole vector.
    pub stack: Vec<Value>,
    /// Global reference slots.
    pub globals: Vec<Value>,
    /// Active try-scope records, innermost last.
    pub handlers: Vec<HandlerFrame>,
    /// Saved instruction pointers of the call stack, innermost last.
    pub ip_stack: Vec<usize>,
    /// True once bytecode dispatch has begun. Before that point there is
    /// no handler stack to search and no traceback to print.
    pub is_runtime: bool,
}

impl VmState {
    /// Creates interpreter state with `global_count` globals initialized
    /// to `none`.
    #[must_use]
    pub fn new(global_count: usize) -> Self {
        Self {
            stack: Vec::new(),
            globals: vec![Value::None; global_count],
            handlers: Vec::new(),
            ip_stack: Vec::new(),
            is_runtime: false,
        }
    }

    /// The collector's root set: every operand stack slot and global.
    #[must_use]
    pub fn gc_roots(&self) -> GcRoots<'_> {
        GcRoots {
            stack: &self.stack,
            globals: &self.globals,
        }
    }

    /// Pushes a batch of handler frames for one try-scope.
    ///
    /// Stamps each frame with the batch size so a later match pops the
    /// whole batch atomically.
    pub fn push_handler_batch(&mut self, mut frames: Vec<HandlerFrame>) {
        let batch: u8 = frames.len().try_into().expect("handler batch fits in u8");
        for frame in &mut frames {
            frame.batch_count = batch;
        }
        self.handlers.extend(frames);
    }

    /// Pops handler frames on normal scope exit.
    pub fn pop_handlers(&mut self, count: usize) {
        let new_len = self.handlers.len().saturating_sub(count);
        self.handlers.truncate(new_len);
    }
}
