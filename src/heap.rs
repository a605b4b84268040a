use crate::error::{LispError, LispResult};
use crate::value::{EnvId, ObjId, PairId, Value};

/// A single cons cell on the heap.
pub struct ConsCell {
    pub car: Value,
    pub cdr: Value,
    pub mark: bool,
}

/// Non-cons heap objects.
pub enum Object {
    /// Immutable byte string.
    Str(Box<[u8]>),
    /// Closure: parameter list, body form, captured frame.
    Lambda { params: Value, body: Value, env: EnvId },
    /// Macro: parameter list and body template. No captured frame.
    Macro { params: Value, body: Value },
    /// Slot on the free list.
    Free,
}

struct ObjectSlot {
    obj: Object,
    mark: bool,
}

/// One link of the lexical scope chain. `bindings` is an alist of
/// two-element `(symbol value)` lists, newest first.
pub struct Frame {
    pub bindings: Value,
    pub outer: Option<EnvId>,
    mark: bool,
}

/// Items waiting to have their children marked.
enum Grey {
    Pair(PairId),
    Obj(ObjId),
    Frame(EnvId),
}

/// The arena holding every cons cell, object and environment frame.
/// Values refer into it by index; nothing is freed until [`Heap::sweep`].
pub struct Heap {
    cells: Vec<ConsCell>,
    free_cells: Vec<PairId>,
    objects: Vec<ObjectSlot>,
    free_objects: Vec<ObjId>,
    frames: Vec<Frame>,
    free_frames: Vec<EnvId>,
    /// Maximum slots per arena.
    capacity: usize,
    /// Number of allocations since last GC (for triggering).
    allocs_since_gc: usize,
    /// GC threshold: collection is due when allocs_since_gc reaches this.
    gc_threshold: usize,
}

impl Heap {
    pub fn new(capacity: usize) -> Self {
        Heap {
            cells: Vec::with_capacity(1024),
            free_cells: Vec::new(),
            objects: Vec::new(),
            free_objects: Vec::new(),
            frames: Vec::new(),
            free_frames: Vec::new(),
            capacity,
            allocs_since_gc: 0,
            gc_threshold: 1024 * 64,
        }
    }

    /// Allocate a new cons cell.
    /// Returns Err(HeapOverflow) if capacity is exceeded.
    pub fn alloc(&mut self, car: Value, cdr: Value) -> LispResult<PairId> {
        self.allocs_since_gc += 1;

        if let Some(id) = self.free_cells.pop() {
            let cell = &mut self.cells[id.0 as usize];
            cell.car = car;
            cell.cdr = cdr;
            cell.mark = false;
            return Ok(id);
        }

        if self.cells.len() >= self.capacity {
            return Err(LispError::HeapOverflow);
        }

        let id = PairId(self.cells.len() as u32);
        self.cells.push(ConsCell {
            car,
            cdr,
            mark: false,
        });
        Ok(id)
    }

    /// Allocate a cons cell and wrap it as a value.
    pub fn cons(&mut self, car: Value, cdr: Value) -> LispResult<Value> {
        Ok(Value::Pair(self.alloc(car, cdr)?))
    }

    #[inline]
    pub fn car(&self, id: PairId) -> Value {
        self.cells[id.0 as usize].car
    }

    #[inline]
    pub fn cdr(&self, id: PairId) -> Value {
        self.cells[id.0 as usize].cdr
    }

    /// CAR of a pair, NIL of NIL, a type error for any other atom.
    pub fn car_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.car(id)),
            other => Err(LispError::Type(format!("CAR of non-list {}", other.type_name()))),
        }
    }

    /// CDR of a pair, NIL of NIL, a type error for any other atom.
    pub fn cdr_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Nil => Ok(Value::Nil),
            Value::Pair(id) => Ok(self.cdr(id)),
            other => Err(LispError::Type(format!("CDR of non-list {}", other.type_name()))),
        }
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[Value]) -> LispResult<Value> {
        let mut result = Value::Nil;
        for &val in values.iter().rev() {
            result = self.cons(val, result)?;
        }
        Ok(result)
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, val: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// Iterate over the elements of a list, stopping at the first non-pair tail.
    pub fn iter(&self, list: Value) -> ListIter<'_> {
        ListIter {
            heap: self,
            current: list,
        }
    }

    // === Objects ===

    fn alloc_object(&mut self, obj: Object) -> LispResult<ObjId> {
        self.allocs_since_gc += 1;

        if let Some(id) = self.free_objects.pop() {
            let slot = &mut self.objects[id.0 as usize];
            slot.obj = obj;
            slot.mark = false;
            return Ok(id);
        }

        if self.objects.len() >= self.capacity {
            return Err(LispError::HeapOverflow);
        }

        let id = ObjId(self.objects.len() as u32);
        self.objects.push(ObjectSlot { obj, mark: false });
        Ok(id)
    }

    pub fn alloc_str(&mut self, bytes: &[u8]) -> LispResult<Value> {
        let id = self.alloc_object(Object::Str(bytes.into()))?;
        Ok(Value::Str(id))
    }

    pub fn alloc_lambda(&mut self, params: Value, body: Value, env: EnvId) -> LispResult<Value> {
        let id = self.alloc_object(Object::Lambda { params, body, env })?;
        Ok(Value::Lambda(id))
    }

    pub fn alloc_macro(&mut self, params: Value, body: Value) -> LispResult<Value> {
        let id = self.alloc_object(Object::Macro { params, body })?;
        Ok(Value::Macro(id))
    }

    pub fn object(&self, id: ObjId) -> &Object {
        &self.objects[id.0 as usize].obj
    }

    /// The bytes of a string object. Empty for any other object.
    pub fn str_bytes(&self, id: ObjId) -> &[u8] {
        match self.object(id) {
            Object::Str(bytes) => bytes,
            _ => &[],
        }
    }

    // === Frames ===

    pub fn alloc_frame(&mut self, outer: Option<EnvId>, bindings: Value) -> LispResult<EnvId> {
        self.allocs_since_gc += 1;

        if let Some(id) = self.free_frames.pop() {
            let frame = &mut self.frames[id.0 as usize];
            frame.bindings = bindings;
            frame.outer = outer;
            frame.mark = false;
            return Ok(id);
        }

        if self.frames.len() >= self.capacity {
            return Err(LispError::HeapOverflow);
        }

        let id = EnvId(self.frames.len() as u32);
        self.frames.push(Frame {
            bindings,
            outer,
            mark: false,
        });
        Ok(id)
    }

    pub fn frame(&self, id: EnvId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    pub fn frame_mut(&mut self, id: EnvId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    // === Equality ===

    /// The language's EQ: identity always matches; otherwise both values must
    /// be the same variant with equal contents. Cons cells, closures and
    /// macros compare by identity only.
    pub fn eq(&self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => self.str_bytes(x) == self.str_bytes(y),
            _ => false,
        }
    }

    // === Statistics ===

    /// Number of live cons cells (accurate after a sweep).
    pub fn live_cells(&self) -> usize {
        self.cells.len() - self.free_cells.len()
    }

    /// Number of live objects (accurate after a sweep).
    pub fn live_objects(&self) -> usize {
        self.objects.len() - self.free_objects.len()
    }

    /// Number of live frames (accurate after a sweep).
    pub fn live_frames(&self) -> usize {
        self.frames.len() - self.free_frames.len()
    }

    /// Due after `gc_threshold` allocations, capped at half the per-arena
    /// capacity.
    pub fn should_gc(&self) -> bool {
        let due = self.gc_threshold.min(self.capacity / 2).max(1);
        self.allocs_since_gc >= due
    }

    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold;
    }

    // === GC ===

    /// Clear all mark bits (phase 1 of mark-sweep).
    pub fn clear_marks(&mut self) {
        for cell in &mut self.cells {
            cell.mark = false;
        }
        for slot in &mut self.objects {
            slot.mark = false;
        }
        for frame in &mut self.frames {
            frame.mark = false;
        }
    }

    /// Mark everything reachable from a value.
    pub fn mark_value(&mut self, val: Value) {
        let mut worklist = Vec::new();
        self.grey_value(val, &mut worklist);
        self.process_worklist(&mut worklist);
    }

    /// Mark everything reachable from a frame.
    pub fn mark_frame(&mut self, env: EnvId) {
        let mut worklist = Vec::new();
        self.grey_frame(env, &mut worklist);
        self.process_worklist(&mut worklist);
    }

    fn grey_value(&mut self, val: Value, worklist: &mut Vec<Grey>) {
        match val {
            Value::Pair(id) => {
                let cell = &mut self.cells[id.0 as usize];
                if !cell.mark {
                    cell.mark = true;
                    worklist.push(Grey::Pair(id));
                }
            }
            Value::Str(id) | Value::Lambda(id) | Value::Macro(id) => {
                let slot = &mut self.objects[id.0 as usize];
                if !slot.mark {
                    slot.mark = true;
                    worklist.push(Grey::Obj(id));
                }
            }
            Value::Nil
            | Value::Symbol(_)
            | Value::Integer(_)
            | Value::Native(_)
            | Value::Stream(_) => {}
        }
    }

    fn grey_frame(&mut self, env: EnvId, worklist: &mut Vec<Grey>) {
        let frame = &mut self.frames[env.0 as usize];
        if !frame.mark {
            frame.mark = true;
            worklist.push(Grey::Frame(env));
        }
    }

    fn process_worklist(&mut self, worklist: &mut Vec<Grey>) {
        while let Some(item) = worklist.pop() {
            match item {
                Grey::Pair(id) => {
                    let car = self.car(id);
                    let cdr = self.cdr(id);
                    self.grey_value(car, worklist);
                    self.grey_value(cdr, worklist);
                }
                Grey::Obj(id) => match *self.object(id) {
                    Object::Lambda { params, body, env } => {
                        self.grey_value(params, worklist);
                        self.grey_value(body, worklist);
                        self.grey_frame(env, worklist);
                    }
                    Object::Macro { params, body } => {
                        self.grey_value(params, worklist);
                        self.grey_value(body, worklist);
                    }
                    Object::Str(_) | Object::Free => {}
                },
                Grey::Frame(id) => {
                    let Frame {
                        bindings, outer, ..
                    } = *self.frame(id);
                    self.grey_value(bindings, worklist);
                    if let Some(outer) = outer {
                        self.grey_frame(outer, worklist);
                    }
                }
            }
        }
    }

    /// Sweep: move every unmarked slot to its free list (phase 2 of mark-sweep).
    pub fn sweep(&mut self) {
        self.free_cells.clear();
        for (i, cell) in self.cells.iter_mut().enumerate() {
            if !cell.mark {
                cell.car = Value::Nil;
                cell.cdr = Value::Nil;
                self.free_cells.push(PairId(i as u32));
            }
        }

        self.free_objects.clear();
        for (i, slot) in self.objects.iter_mut().enumerate() {
            if !slot.mark {
                slot.obj = Object::Free;
                self.free_objects.push(ObjId(i as u32));
            }
        }

        self.free_frames.clear();
        for (i, frame) in self.frames.iter_mut().enumerate() {
            if !frame.mark {
                frame.bindings = Value::Nil;
                frame.outer = None;
                self.free_frames.push(EnvId(i as u32));
            }
        }

        self.allocs_since_gc = 0;
    }
}

/// Iterator over list elements. See [`Heap::iter`].
pub struct ListIter<'a> {
    heap: &'a Heap,
    current: Value,
}

impl Iterator for ListIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let id = self.current.as_pair()?;
        self.current = self.heap.cdr(id);
        Some(self.heap.car(id))
    }
}
