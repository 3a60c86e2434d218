use std::{collections::BTreeMap, fmt};

use ahash::AHashMap;

use crate::{
    exceptions::{BuiltinExc, RunError, RunResult},
    types::{Callable, Dict, Instance, List, Set},
    value::{Value, num_repr},
};

/// Number of object slots in one runtime block.
pub const BLOCK_CAPACITY: u16 = 64;

/// How many completely empty blocks the collector keeps resident after a
/// sweep. Excess empty blocks are released back to the allocator.
pub const MAX_ALLOWED_EMPTY_BLOCKS: usize = 2;

/// Container rendering stops descending at this depth.
const MAX_RENDER_DEPTH: u32 = 4;

/// Stable identifier of a runtime block.
///
/// Assigned monotonically at block creation and never reused, so a
/// `BlockId` held across collections stays unambiguous even after the
/// block itself was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{id}", id = self.0)
    }
}

/// Stable handle to a heap object slot.
///
/// A handle is the pair (owning block, slot index). Dereferencing goes
/// back through the heap, and a freed slot holds `None`, so a stale handle
/// can never yield object data without the allocator having filled the
/// slot again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId {
    block: BlockId,
    slot: u16,
}

impl HeapId {
    /// The block this object was allocated from.
    #[inline]
    #[must_use]
    pub fn block(self) -> BlockId {
        self.block
    }

    #[cfg(test)]
    pub(crate) fn testing(block: u32, slot: u16) -> Self {
        Self {
            block: BlockId(block),
            slot,
        }
    }
}

/// Payload of a heap object slot.
///
/// The variants are the heap-allocated shapes of the language: marking
/// matches exhaustively over them, so a future variant that forgets its
/// visitor fails to compile rather than leaking.
#[derive(Debug)]
pub enum HeapData {
    Str(Box<str>),
    List(List),
    Dict(Dict),
    Set(Set),
    Callable(Callable),
    Instance(Instance),
}

impl HeapData {
    /// The collector's "iterable" predicate: containers hold values that
    /// must themselves be visited.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Dict(_) | Self::Set(_) | Self::Instance(_))
    }

    /// Static variant name for stats breakdowns.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "Str",
            Self::List(_) => "List",
            Self::Dict(_) => "Dict",
            Self::Set(_) => "Set",
            Self::Callable(_) => "Callable",
            Self::Instance(_) => "Instance",
        }
    }
}

/// One live object cell inside a block slot.
///
/// `data` is `None` only transiently while a container operation has
/// borrowed the payload out of the slot.
#[derive(Debug)]
struct HeapObject {
    marked: bool,
    konst: bool,
    /// Intrusive link threading every live object; sweep traverses it.
    next: Option<HeapId>,
    data: Option<HeapData>,
}

/// A fixed-capacity block of object slots with an internal free-stack.
#[derive(Debug)]
struct RuntimeBlock {
    id: BlockId,
    slots: Box<[Option<HeapObject>]>,
    /// Stack of free slot indices; allocation pops, deallocation pushes.
    free_stack: Vec<u16>,
    available: u16,
    /// Set when a full block regains a free slot, so the collector knows
    /// to reinsert it into the scheduler.
    revived: bool,
}

impl RuntimeBlock {
    fn new(id: BlockId) -> Self {
        let slots = (0..BLOCK_CAPACITY).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            id,
            slots,
            free_stack: (0..BLOCK_CAPACITY).collect(),
            available: BLOCK_CAPACITY,
            revived: false,
        }
    }

    fn is_full(&self) -> bool {
        self.available == 0
    }

    fn is_empty(&self) -> bool {
        self.available == BLOCK_CAPACITY
    }

    /// Pops one free slot index.
    fn allocate(&mut self) -> RunResult<u16> {
        if self.is_full() {
            return Err(RunError::new(BuiltinExc::ObjManagerError, "Allocating from a full block"));
        }
        let slot = self
            .free_stack
            .pop()
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Free stack out of sync with slot count"))?;
        self.available -= 1;
        Ok(slot)
    }

    /// Returns a slot to the free-stack, dropping the cell it held.
    fn release(&mut self, slot: u16) -> RunResult<()> {
        if self.is_empty() {
            return Err(RunError::new(
                BuiltinExc::ObjManagerError,
                "Deallocating from an empty block",
            ));
        }
        let cell = self
            .slots
            .get_mut(usize::from(slot))
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Slot index out of range"))?
            .take();
        if cell.is_none() {
            return Err(RunError::new(BuiltinExc::ObjManagerError, "Deallocating a free slot"));
        }
        if self.is_full() {
            self.revived = true;
        }
        self.free_stack.push(slot);
        self.available += 1;
        Ok(())
    }
}

/// Scheduler entry: a block reference with its cached free-slot count.
#[derive(Debug, Clone, Copy)]
struct SchedulerEntry {
    block: BlockId,
    available: u16,
}

/// Binary min-heap ordering blocks by ascending free-slot count.
///
/// The root is always the block closest to becoming full, so allocation
/// packs objects into nearly-full blocks and leaves the rest to drain and
/// become reclaimable. Lookup by block ID is a linear scan; block counts
/// are small relative to object counts, so this stays cheap next to the
/// per-object work the collector does.
#[derive(Debug, Default)]
struct BlockScheduler {
    entries: Vec<SchedulerEntry>,
}

impl BlockScheduler {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry and sifts it up.
    fn add(&mut self, block: BlockId, available: u16) {
        self.entries.push(SchedulerEntry { block, available });
        self.sift_up(self.entries.len() - 1);
    }

    /// Removes a block: swap in the last entry, then restore heap order in
    /// both directions.
    fn remove(&mut self, block: BlockId) -> RunResult<()> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.block == block)
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Block not found in scheduler"))?;
        self.entries.swap_remove(index);
        if index < self.entries.len() {
            self.sift_down(index);
            self.sift_up(index);
        }
        Ok(())
    }

    /// Re-keys a block in place; absent blocks are ignored, matching the
    /// transient exclusion of full blocks.
    fn update(&mut self, block: BlockId, available: u16) {
        if let Some(index) = self.entries.iter().position(|entry| entry.block == block) {
            self.entries[index].available = available;
            self.sift_up(index);
            self.sift_down(index);
        }
    }

    /// The block with the globally minimum free-slot count.
    fn top(&self) -> RunResult<BlockId> {
        self.entries
            .first()
            .map(|entry| entry.block)
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Taking the top of an empty scheduler"))
    }

    /// Bulk refresh after a sweep: re-read every cached key, then
    /// re-heapify bottom-up. Cheaper than per-block updates across a
    /// whole collection's worth of deallocations.
    fn refresh(&mut self, blocks: &AHashMap<BlockId, RuntimeBlock>) {
        for entry in &mut self.entries {
            if let Some(block) = blocks.get(&entry.block) {
                entry.available = block.available;
            }
        }
        for index in (0..self.entries.len() / 2).rev() {
            self.sift_down(index);
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.entries[parent].available <= self.entries[index].available {
                break;
            }
            self.entries.swap(parent, index);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < self.entries.len() && self.entries[left].available < self.entries[smallest].available {
                smallest = left;
            }
            if right < self.entries.len() && self.entries[right].available < self.entries[smallest].available {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.entries.swap(smallest, index);
            index = smallest;
        }
    }
}

/// The collector's root set, enumerated by the interpreter: the operand
/// stack and the global reference slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcRoots<'a> {
    pub stack: &'a [Value],
    pub globals: &'a [Value],
}

impl GcRoots<'static> {
    /// An empty root set (startup, or tests exercising full sweeps).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            stack: &[],
            globals: &[],
        }
    }
}

/// Snapshot of heap state at a point in time.
///
/// `free_slots + live_objects == total_slots` holds at every quiescent
/// point; tests lean on it as the allocator's conservation law.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of live objects across all blocks.
    pub live_objects: usize,
    /// Free slots available without growing the heap.
    pub free_slots: usize,
    /// Total slot capacity across all blocks.
    pub total_slots: usize,
    /// Number of resident blocks.
    pub blocks: usize,
    /// Blocks currently visible to the allocation scheduler.
    pub scheduled_blocks: usize,
    /// Breakdown of live objects by payload variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live {live}, free {free}/{total}, blocks {blocks} ({sched} scheduled)",
            live = self.live_objects,
            free = self.free_slots,
            total = self.total_slots,
            blocks = self.blocks,
            sched = self.scheduled_blocks,
        )?;
        for (name, count) in &self.objects_by_type {
            write!(f, "; {name}: {count}")?;
        }
        Ok(())
    }
}

/// The runtime heap: block registry, allocation scheduler, and the
/// mark-and-sweep collector.
///
/// Owns every block and, through them, every live object. Allocation is
/// the only way objects come into existence and collection the only way
/// they die; both run synchronously on the interpreter thread, so nothing
/// here needs locking.
#[derive(Debug)]
pub struct Heap {
    /// Registry mapping block IDs to blocks, independent of scheduler
    /// position. Deallocation and eviction look blocks up here.
    blocks: AHashMap<BlockId, RuntimeBlock>,
    scheduler: BlockScheduler,
    next_block_id: u32,
    /// Head of the intrusive list threading every live object.
    head: Option<HeapId>,
    live_objects: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates the heap with one empty block already scheduled.
    #[must_use]
    pub fn new() -> Self {
        let mut heap = Self {
            blocks: AHashMap::new(),
            scheduler: BlockScheduler::default(),
            next_block_id: 0,
            head: None,
            live_objects: 0,
        };
        let initial = heap.new_block();
        heap.scheduler.add(initial, BLOCK_CAPACITY);
        heap
    }

    /// Allocates and registers a fresh block. The caller decides whether
    /// it enters the scheduler.
    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, RuntimeBlock::new(id));
        id
    }

    /// The sole allocation entry point.
    ///
    /// When the scheduler has no block with free capacity, a full
    /// collection runs first; only if that recovers nothing does the heap
    /// grow by one block. The new object is linked at the head of the
    /// heap list and returned by handle.
    ///
    /// Any heap reference stored inside `data` must be reachable from
    /// `roots`, or a collection triggered by this very call could sweep it.
    pub fn allocate(&mut self, data: HeapData, roots: GcRoots<'_>) -> RunResult<HeapId> {
        if self.scheduler.is_empty() {
            self.collect_garbage(roots)?;
        }
        if self.scheduler.is_empty() {
            let id = self.new_block();
            self.scheduler.add(id, BLOCK_CAPACITY);
        }
        self.place(data, false)
    }

    /// Allocates a permanent object: never marked, never swept.
    ///
    /// Const objects are created by the front end before the interpreter
    /// has a root set, so exhaustion grows the heap instead of collecting.
    pub fn allocate_const(&mut self, data: HeapData) -> RunResult<HeapId> {
        if self.scheduler.is_empty() {
            let id = self.new_block();
            self.scheduler.add(id, BLOCK_CAPACITY);
        }
        self.place(data, true)
    }

    fn place(&mut self, data: HeapData, konst: bool) -> RunResult<HeapId> {
        let top = self.scheduler.top()?;
        let block = self
            .blocks
            .get_mut(&top)
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Scheduled block missing from registry"))?;
        let slot = block.allocate()?;
        let available = block.available;
        let became_full = block.is_full();

        let id = HeapId { block: top, slot };
        block.slots[usize::from(slot)] = Some(HeapObject {
            marked: false,
            konst,
            next: self.head,
            data: Some(data),
        });
        self.head = Some(id);
        self.live_objects += 1;

        if became_full {
            self.scheduler.remove(top)?;
        } else {
            self.scheduler.update(top, available);
        }
        Ok(id)
    }

    /// Runs a full stop-the-world collection cycle.
    ///
    /// Marks everything reachable from `roots`, sweeps the heap list,
    /// reinstates revived blocks, and trims excess empty blocks. Returns
    /// the number of objects removed. Mark bits are all false again when
    /// this returns.
    pub fn collect_garbage(&mut self, roots: GcRoots<'_>) -> RunResult<usize> {
        self.mark(roots)?;
        let removed = self.sweep()?;
        if removed > 0 {
            self.revive_blocks();
        }
        self.evict_empty_blocks()?;
        Ok(removed)
    }

    /// Mark phase: an explicit work-list walk from the roots.
    ///
    /// The mark bit doubles as the cycle guard: a marked object is never
    /// re-descended, so cyclic containers terminate. Const objects are
    /// skipped entirely; they are permanent and their contents are rooted
    /// through the constant tables.
    fn mark(&mut self, roots: GcRoots<'_>) -> RunResult<()> {
        let mut work_list: Vec<HeapId> = roots
            .stack
            .iter()
            .chain(roots.globals)
            .filter_map(Value::heap_id)
            .collect();

        while let Some(id) = work_list.pop() {
            let cell = self.cell_mut(id).map_err(|_| malformed_root())?;
            if cell.konst || cell.marked {
                continue;
            }
            cell.marked = true;
            let Some(data) = cell.data.as_ref() else {
                return Err(RunError::new(BuiltinExc::GcError, "Object data borrowed during mark"));
            };
            collect_child_ids(data, &mut work_list);
        }
        Ok(())
    }

    /// Sweep phase: one pass over the intrusive heap list.
    ///
    /// Marked objects are unmarked and kept; unmarked objects are unlinked
    /// and their slots returned to the owning block.
    fn sweep(&mut self) -> RunResult<usize> {
        let mut removed = 0usize;
        let mut prev: Option<HeapId> = None;
        let mut curr = self.head;
        while let Some(id) = curr {
            let cell = self.cell_mut(id)?;
            if cell.konst || cell.marked {
                cell.marked = false;
                prev = Some(id);
                curr = cell.next;
                continue;
            }
            let next = cell.next;
            match prev {
                None => self.head = next,
                Some(prev_id) => self.cell_mut(prev_id)?.next = next,
            }
            let block = self
                .blocks
                .get_mut(&id.block)
                .ok_or_else(|| RunError::new(BuiltinExc::GcError, "Owning block missing during sweep"))?;
            block.release(id.slot)?;
            removed += 1;
            self.live_objects -= 1;
            curr = next;
        }
        Ok(removed)
    }

    /// Post-sweep bookkeeping: refresh the scheduler's cached keys in one
    /// re-heapify, then re-admit blocks that regained capacity while
    /// excluded as full.
    fn revive_blocks(&mut self) {
        let Self { blocks, scheduler, .. } = self;
        scheduler.refresh(blocks);
        for block in blocks.values_mut() {
            if block.revived {
                block.revived = false;
                scheduler.add(block.id, block.available);
            }
        }
    }

    /// Frees completely empty blocks beyond the configured reserve.
    ///
    /// The eviction count saturates at zero: when empty blocks do not
    /// exceed the reserve, nothing is freed.
    fn evict_empty_blocks(&mut self) -> RunResult<()> {
        let empty: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|block| block.is_empty())
            .map(|block| block.id)
            .collect();
        let excess = empty.len().saturating_sub(MAX_ALLOWED_EMPTY_BLOCKS);
        for id in empty.into_iter().take(excess) {
            self.scheduler.remove(id)?;
            self.blocks.remove(&id);
        }
        Ok(())
    }

    fn cell(&self, id: HeapId) -> RunResult<&HeapObject> {
        self.blocks
            .get(&id.block)
            .and_then(|block| block.slots.get(usize::from(id.slot)).and_then(Option::as_ref))
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Dangling object handle"))
    }

    fn cell_mut(&mut self, id: HeapId) -> RunResult<&mut HeapObject> {
        self.blocks
            .get_mut(&id.block)
            .and_then(|block| block.slots.get_mut(usize::from(id.slot)).and_then(Option::as_mut))
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Dangling object handle"))
    }

    /// Returns the payload of a live object.
    ///
    /// # Panics
    /// Panics on a dangling handle or while the payload is borrowed out;
    /// both indicate a heap-management bug, not a recoverable condition.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.cell(id)
            .expect("Heap::get: dangling handle")
            .data
            .as_ref()
            .expect("Heap::get: data already borrowed")
    }

    /// Non-panicking payload access; `None` for dangling handles and
    /// borrowed-out payloads.
    #[must_use]
    pub(crate) fn data(&self, id: HeapId) -> Option<&HeapData> {
        self.cell(id).ok().and_then(|cell| cell.data.as_ref())
    }

    /// Whether the object is a permanent (const) allocation.
    pub fn is_const(&self, id: HeapId) -> RunResult<bool> {
        Ok(self.cell(id)?.konst)
    }

    /// Free slots remaining in a block, when it is still resident.
    #[must_use]
    pub fn available_slots(&self, block: BlockId) -> Option<u16> {
        self.blocks.get(&block).map(|block| block.available)
    }

    fn take_data(&mut self, id: HeapId) -> RunResult<HeapData> {
        self.cell_mut(id)?
            .data
            .take()
            .ok_or_else(|| RunError::new(BuiltinExc::ObjManagerError, "Object data already borrowed"))
    }

    fn restore_data(&mut self, id: HeapId, data: HeapData) -> RunResult<()> {
        let cell = self.cell_mut(id)?;
        cell.data = Some(data);
        Ok(())
    }

    /// Appends a value to a heap list.
    pub fn list_push(&mut self, id: HeapId, value: Value) -> RunResult<()> {
        match self.cell_mut(id)?.data.as_mut() {
            Some(HeapData::List(list)) => {
                list.push(value);
                Ok(())
            }
            Some(_) => Err(RunError::new(BuiltinExc::ListError, "Value is not a list")),
            None => Err(RunError::new(BuiltinExc::ObjManagerError, "Object data already borrowed")),
        }
    }

    /// Inserts into a heap dict, returning the previous value for the key.
    pub fn dict_insert(&mut self, id: HeapId, key: Value, value: Value) -> RunResult<Option<Value>> {
        let mut data = self.take_data(id)?;
        let result = match &mut data {
            HeapData::Dict(dict) => dict.insert(key, value, self),
            _ => Err(RunError::new(BuiltinExc::DictError, "Value is not a dict")),
        };
        self.restore_data(id, data)?;
        result
    }

    /// Looks up a key in a heap dict.
    pub fn dict_get(&self, id: HeapId, key: &Value) -> RunResult<Option<Value>> {
        match self.data(id) {
            Some(HeapData::Dict(dict)) => Ok(dict.get(key, self)?.copied()),
            Some(_) => Err(RunError::new(BuiltinExc::DictError, "Value is not a dict")),
            None => Err(RunError::new(BuiltinExc::ObjManagerError, "Dangling object handle")),
        }
    }

    /// Adds a member to a heap set, returning true when newly added.
    pub fn set_insert(&mut self, id: HeapId, value: Value) -> RunResult<bool> {
        let mut data = self.take_data(id)?;
        let result = match &mut data {
            HeapData::Set(set) => set.insert(value, self),
            _ => Err(RunError::new(BuiltinExc::SetError, "Value is not a set")),
        };
        self.restore_data(id, data)?;
        result
    }

    /// Tests membership in a heap set.
    pub fn set_contains(&self, id: HeapId, value: &Value) -> RunResult<bool> {
        match self.data(id) {
            Some(HeapData::Set(set)) => set.contains(value, self),
            Some(_) => Err(RunError::new(BuiltinExc::SetError, "Value is not a set")),
            None => Err(RunError::new(BuiltinExc::ObjManagerError, "Dangling object handle")),
        }
    }

    /// Sets an attribute on a user object.
    pub fn instance_set_attr(&mut self, id: HeapId, name: &str, value: Value) -> RunResult<Option<Value>> {
        match self.cell_mut(id)?.data.as_mut() {
            Some(HeapData::Instance(instance)) => Ok(instance.set_attr(name, value)),
            Some(_) => Err(RunError::new(BuiltinExc::AttributeError, "Value has no attributes")),
            None => Err(RunError::new(BuiltinExc::ObjManagerError, "Object data already borrowed")),
        }
    }

    /// Reads an attribute from a user object.
    pub fn instance_get_attr(&self, id: HeapId, name: &str) -> RunResult<Option<Value>> {
        match self.data(id) {
            Some(HeapData::Instance(instance)) => Ok(instance.get_attr(name).copied()),
            Some(_) => Err(RunError::new(BuiltinExc::AttributeError, "Value has no attributes")),
            None => Err(RunError::new(BuiltinExc::ObjManagerError, "Dangling object handle")),
        }
    }

    /// Takes a snapshot of heap state.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        let mut free_slots = 0usize;
        for block in self.blocks.values() {
            free_slots += usize::from(block.available);
            for cell in block.slots.iter().flatten() {
                if let Some(data) = cell.data.as_ref() {
                    *objects_by_type.entry(data.variant_name()).or_insert(0) += 1;
                }
            }
        }
        HeapStats {
            live_objects: self.live_objects,
            free_slots,
            total_slots: self.blocks.len() * usize::from(BLOCK_CAPACITY),
            blocks: self.blocks.len(),
            scheduled_blocks: self.scheduler.len(),
            objects_by_type,
        }
    }

    /// Renders a value for diagnostics and the REPL-facing `print`.
    #[must_use]
    pub fn render_value(&self, value: &Value) -> String {
        let mut out = String::new();
        self.render_into(&mut out, value, 0, false);
        out
    }

    fn render_into(&self, out: &mut String, value: &Value, depth: u32, quoted: bool) {
        match value {
            Value::None => out.push_str("none"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Num(n) => out.push_str(&num_repr(*n)),
            Value::Ref(id) => match self.data(*id) {
                None => out.push_str("<dangling>"),
                Some(HeapData::Str(s)) => {
                    if quoted {
                        out.push_str(&format!("{s:?}"));
                    } else {
                        out.push_str(s);
                    }
                }
                Some(HeapData::Callable(callable)) => {
                    out.push_str(&format!("<fn {name}>", name = callable.name));
                }
                Some(HeapData::Instance(instance)) => {
                    out.push_str(&format!("<object with {n} attrs>", n = instance.len()));
                }
                Some(data) if depth >= MAX_RENDER_DEPTH => {
                    out.push_str(match data {
                        HeapData::List(_) => "[...]",
                        _ => "{...}",
                    });
                }
                Some(HeapData::List(list)) => {
                    out.push('[');
                    for (i, item) in list.as_slice().iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(out, item, depth + 1, true);
                    }
                    out.push(']');
                }
                Some(HeapData::Dict(dict)) => {
                    out.push('{');
                    for (i, (key, value)) in dict.entries().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(out, key, depth + 1, true);
                        out.push_str(": ");
                        self.render_into(out, value, depth + 1, true);
                    }
                    out.push('}');
                }
                Some(HeapData::Set(set)) => {
                    out.push('{');
                    for (i, member) in set.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(out, member, depth + 1, true);
                    }
                    out.push('}');
                }
            },
        }
    }
}

fn malformed_root() -> RunError {
    RunError::new(BuiltinExc::GcError, "Malformed root: dangling object handle")
}

/// Collects child handles from a payload for the mark walk.
///
/// Lists contribute every element, dicts every entry's key and value,
/// sets every member, user objects every attribute value. Ref-free
/// containers are skipped wholesale via their `contains_refs` flags.
fn collect_child_ids(data: &HeapData, work_list: &mut Vec<HeapId>) {
    match data {
        HeapData::Str(_) | HeapData::Callable(_) => {}
        HeapData::List(list) => {
            if !list.contains_refs() {
                return;
            }
            work_list.extend(list.as_slice().iter().filter_map(Value::heap_id));
        }
        HeapData::Dict(dict) => {
            if !dict.contains_refs() {
                return;
            }
            for (key, value) in dict.entries() {
                work_list.extend(key.heap_id());
                work_list.extend(value.heap_id());
            }
        }
        HeapData::Set(set) => {
            if !set.contains_refs() {
                return;
            }
            work_list.extend(set.iter().filter_map(Value::heap_id));
        }
        HeapData::Instance(instance) => {
            if !instance.contains_refs() {
                return;
            }
            work_list.extend(instance.attrs().filter_map(|(_, value)| value.heap_id()));
        }
    }
}
