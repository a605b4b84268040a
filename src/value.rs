use std::fmt;

/// Unique identifier for an interned symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Index into the cons-cell heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairId(pub u32);

/// Index into the object heap (strings, lambdas, macros).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

/// Index into the environment-frame heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub u32);

/// Index into the native function table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// Unique identifier for an open stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u32);

/// The fundamental lips value. Copy semantics: cons cells, strings,
/// closures and macros live in the heap and are referred to by handle.
///
/// The derived `PartialEq` compares handles, i.e. identity. Use
/// [`crate::heap::Heap::eq`] for the language's `EQ`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// The empty list, also false.
    Nil,
    Symbol(SymbolId),
    Integer(i64),
    Str(ObjId),
    Pair(PairId),
    Lambda(ObjId),
    Macro(ObjId),
    Native(NativeId),
    Stream(StreamId),
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn as_pair(self) -> Option<PairId> {
        match self {
            Value::Pair(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_symbol(self) -> Option<SymbolId> {
        match self {
            Value::Symbol(id) => Some(id),
            _ => None,
        }
    }

    /// Returns true if this value is an atom (not a pair). NIL is an atom.
    pub fn is_atom(self) -> bool {
        !self.is_pair()
    }

    /// Everything except NIL counts as true.
    pub fn is_truthy(self) -> bool {
        !self.is_nil()
    }

    /// Name of the variant, used in type errors.
    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Str(_) => "string",
            Value::Pair(_) => "cons",
            Value::Lambda(_) => "lambda",
            Value::Macro(_) => "macro",
            Value::Native(_) => "function",
            Value::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Symbol(id) => write!(f, "Sym({})", id.0),
            Value::Integer(n) => write!(f, "Int({})", n),
            Value::Str(id) => write!(f, "Str({})", id.0),
            Value::Pair(id) => write!(f, "Pair({})", id.0),
            Value::Lambda(id) => write!(f, "Lambda({})", id.0),
            Value::Macro(id) => write!(f, "Macro({})", id.0),
            Value::Native(id) => write!(f, "Native({})", id.0),
            Value::Stream(id) => write!(f, "Stream({})", id.0),
        }
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairId({})", self.0)
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.0)
    }
}

impl fmt::Debug for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvId({})", self.0)
    }
}

impl fmt::Debug for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeId({})", self.0)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}
