use crate::error::LispResult;
use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::value::{EnvId, SymbolId, Value};

/// Attach a child frame to `outer` holding the given alist of bindings.
pub fn new_frame(heap: &mut Heap, outer: Option<EnvId>, bindings: Value) -> LispResult<EnvId> {
    heap.alloc_frame(outer, bindings)
}

/// Look a symbol up from the innermost frame outwards, newest binding first.
/// Returns the bound symbol and its value, or None when nothing binds it.
pub fn resolve(heap: &Heap, env: EnvId, name: SymbolId) -> Option<(SymbolId, Value)> {
    let key = Value::Symbol(name);
    let mut current = Some(env);
    while let Some(id) = current {
        let frame = heap.frame(id);
        if let Some(binding) = assoc(heap, key, frame.bindings) {
            let val = heap.cdr_val(binding).and_then(|rest| heap.car_val(rest)).ok()?;
            return Some((name, val));
        }
        current = frame.outer;
    }
    None
}

/// Prepend `(name val)` to the frame. A name already bound in this same
/// frame is reported and then shadowed.
pub fn bind(
    heap: &mut Heap,
    symbols: &SymbolTable,
    env: EnvId,
    name: SymbolId,
    val: Value,
) -> LispResult<()> {
    let key = Value::Symbol(name);
    let old = heap.frame(env).bindings;
    if assoc(heap, key, old).is_some() {
        log::warn!("redefining {}", symbols.display_name(name));
    }
    let binding = heap.list(&[key, val])?;
    let bindings = heap.cons(binding, old)?;
    heap.frame_mut(env).bindings = bindings;
    Ok(())
}

/// Zip two lists into `((k1 v1) (k2 v2) ...)`, stopping at the shorter one.
pub fn pair(heap: &mut Heap, keys: Value, vals: Value) -> LispResult<Value> {
    let zipped: Vec<(Value, Value)> = heap.iter(keys).zip(heap.iter(vals)).collect();
    let mut entries = Vec::with_capacity(zipped.len());
    for (k, v) in zipped {
        entries.push(heap.list(&[k, v])?);
    }
    heap.list(&entries)
}

/// First entry of `alist` whose key is EQ to `key`. Entries that are not
/// pairs are skipped.
pub fn assoc(heap: &Heap, key: Value, alist: Value) -> Option<Value> {
    heap.iter(alist).find(|&entry| match entry {
        Value::Pair(id) => heap.eq(heap.car(id), key),
        _ => false,
    })
}
