use std::borrow::Cow;
use std::collections::HashMap;

use crate::value::SymbolId;

/// Interned symbol table. Each unique symbol name maps to a unique SymbolId,
/// so `(EQ (QUOTE FOO) (QUOTE FOO))` is a handle comparison. Names are raw
/// bytes: two symbols are the same only if their names match byte for byte.
pub struct SymbolTable {
    name_to_id: HashMap<Box<[u8]>, SymbolId>,
    id_to_name: Vec<Box<[u8]>>,
}

/// Well-known symbol IDs, pre-interned at startup.
/// These must match the order of interning in SymbolTable::new().
pub mod sym {
    use crate::value::SymbolId;

    pub const T: SymbolId = SymbolId(0);
    // Special forms
    pub const QUOTE: SymbolId = SymbolId(1);
    pub const LAMBDA: SymbolId = SymbolId(2);
    pub const MACRO: SymbolId = SymbolId(3);
    pub const LABEL: SymbolId = SymbolId(4);
    pub const COND: SymbolId = SymbolId(5);
    pub const EVAL: SymbolId = SymbolId(6);
    pub const PRINT: SymbolId = SymbolId(7);
    pub const LOOP: SymbolId = SymbolId(8);
    pub const READ: SymbolId = SymbolId(9);
    pub const ERROR: SymbolId = SymbolId(10);
    // Reader
    pub const UNQUOTE: SymbolId = SymbolId(11);
    // Native functions
    pub const CONS: SymbolId = SymbolId(12);
    pub const CAR: SymbolId = SymbolId(13);
    pub const CDR: SymbolId = SymbolId(14);
    pub const ATOM: SymbolId = SymbolId(15);
    pub const EQ: SymbolId = SymbolId(16);
    pub const ASSOC: SymbolId = SymbolId(17);
    pub const PAIR: SymbolId = SymbolId(18);
    pub const LIST: SymbolId = SymbolId(19);
    // Reserved globals
    pub const ERROR_HANDLER: SymbolId = SymbolId(20);
    pub const STANDARD_INPUT: SymbolId = SymbolId(21);
    pub const STANDARD_OUTPUT: SymbolId = SymbolId(22);
}

/// The operators the evaluator handles itself instead of applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Lambda,
    Macro,
    Label,
    Cond,
    Eval,
    Print,
    Loop,
    Read,
    Error,
}

impl SpecialForm {
    /// Classify an operator symbol. Identity comparison only, so a special
    /// form name can never be shadowed by a binding.
    pub fn classify(id: SymbolId) -> Option<SpecialForm> {
        Some(match id {
            sym::QUOTE => SpecialForm::Quote,
            sym::LAMBDA => SpecialForm::Lambda,
            sym::MACRO => SpecialForm::Macro,
            sym::LABEL => SpecialForm::Label,
            sym::COND => SpecialForm::Cond,
            sym::EVAL => SpecialForm::Eval,
            sym::PRINT => SpecialForm::Print,
            sym::LOOP => SpecialForm::Loop,
            sym::READ => SpecialForm::Read,
            sym::ERROR => SpecialForm::Error,
            _ => return None,
        })
    }
}

impl SymbolTable {
    /// Create a new symbol table with all well-known symbols pre-interned.
    /// The order MUST match the constants in the `sym` module above.
    pub fn new() -> Self {
        let names = [
            "T",
            "QUOTE", "LAMBDA", "MACRO", "LABEL", "COND", "EVAL", "PRINT", "LOOP", "READ", "ERROR",
            "UNQUOTE",
            "CONS", "CAR", "CDR", "ATOM", "EQ", "ASSOC", "PAIR", "LIST",
            "*ERROR-HANDLER*", "*STANDARD-INPUT*", "*STANDARD-OUTPUT*",
        ];

        let mut table = SymbolTable {
            name_to_id: HashMap::with_capacity(names.len()),
            id_to_name: Vec::with_capacity(names.len()),
        };
        for name in names {
            table.intern(name);
        }
        table
    }

    /// Intern a symbol name. Returns the existing ID if already interned,
    /// or creates a new one.
    pub fn intern(&mut self, name: impl AsRef<[u8]>) -> SymbolId {
        let name = name.as_ref();
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = SymbolId(self.id_to_name.len() as u32);
        self.name_to_id.insert(name.into(), id);
        self.id_to_name.push(name.into());
        id
    }

    /// Look up a symbol name by its ID.
    pub fn name(&self, id: SymbolId) -> &[u8] {
        &self.id_to_name[id.0 as usize]
    }

    /// The name as text for messages; invalid UTF-8 is replaced.
    pub fn display_name(&self, id: SymbolId) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name(id))
    }

    /// Look up a symbol ID by name, without interning.
    pub fn lookup(&self, name: impl AsRef<[u8]>) -> Option<SymbolId> {
        self.name_to_id.get(name.as_ref()).copied()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
