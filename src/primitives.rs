use crate::environment;
use crate::error::LispResult;
use crate::eval::Interpreter;
use crate::symbol::sym;
use crate::value::{NativeId, Value};

/// A function implemented in Rust. `arity` is the exact number of
/// arguments, or -1 for any number.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: i32,
    pub func: fn(&mut Interpreter, &[Value]) -> LispResult<Value>,
}

/// Every native function, indexed by `NativeId`. Installed into the global
/// frame under `name` when an interpreter is created.
pub static NATIVES: &[NativeFunction] = &[
    NativeFunction { name: "CONS", arity: 2, func: prim_cons },
    NativeFunction { name: "CAR", arity: 1, func: prim_car },
    NativeFunction { name: "CDR", arity: 1, func: prim_cdr },
    NativeFunction { name: "ATOM", arity: 1, func: prim_atom },
    NativeFunction { name: "EQ", arity: 2, func: prim_eq },
    NativeFunction { name: "ASSOC", arity: 2, func: prim_assoc },
    NativeFunction { name: "PAIR", arity: 2, func: prim_pair },
    NativeFunction { name: "LIST", arity: -1, func: prim_list },
];

pub fn native(id: NativeId) -> Option<&'static NativeFunction> {
    NATIVES.get(id.0 as usize)
}

pub fn native_name(id: NativeId) -> &'static str {
    native(id).map_or("?", |n| n.name)
}

/// Find a native function by name.
pub fn lookup(name: &str) -> Option<NativeId> {
    NATIVES
        .iter()
        .position(|n| n.name == name)
        .map(|i| NativeId(i as u32))
}

fn truth(b: bool) -> Value {
    if b {
        Value::Symbol(sym::T)
    } else {
        Value::Nil
    }
}

/// (CONS a b): create a new cons cell.
fn prim_cons(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    interp.heap.cons(args[0], args[1])
}

/// (CAR x): car of pair, NIL of NIL.
fn prim_car(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    interp.heap.car_val(args[0])
}

/// (CDR x): cdr of pair, NIL of NIL.
fn prim_cdr(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    interp.heap.cdr_val(args[0])
}

/// (ATOM x): T for anything but a cons, NIL included.
fn prim_atom(_interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    Ok(truth(args[0].is_atom()))
}

fn prim_eq(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    Ok(truth(interp.heap.eq(args[0], args[1])))
}

/// (ASSOC key alist): the value of the first entry whose key is EQ to
/// `key`, or NIL. Entries may be `(k v)` lists or `(k . v)` pairs.
fn prim_assoc(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    let heap = &interp.heap;
    match environment::assoc(heap, args[0], args[1]) {
        Some(entry) => match heap.cdr_val(entry)? {
            Value::Pair(rest) => Ok(heap.car(rest)),
            tail => Ok(tail),
        },
        None => Ok(Value::Nil),
    }
}

/// (PAIR keys vals): `((k1 v1) (k2 v2) ...)`, truncated to the shorter list.
fn prim_pair(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    environment::pair(&mut interp.heap, args[0], args[1])
}

fn prim_list(interp: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
    interp.heap.list(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LispError;
    use pretty_assertions::assert_eq;

    fn eval_print(src: &str) -> String {
        let mut interp = Interpreter::new().unwrap();
        let val = interp.eval_str(src).unwrap();
        interp.print(val)
    }

    #[test]
    fn cons_car_cdr() {
        assert_eq!(eval_print("(CONS 1 2)"), "(1 . 2)");
        assert_eq!(eval_print("(CONS 1 (CONS 2 NIL))"), "(1 2)");
        assert_eq!(eval_print("(CAR (QUOTE (A B)))"), "A");
        assert_eq!(eval_print("(CDR (QUOTE (A B)))"), "(B)");
        assert_eq!(eval_print("(CAR NIL)"), "NIL");
        assert_eq!(eval_print("(CDR NIL)"), "NIL");
    }

    #[test]
    fn car_of_symbol_is_a_type_error() {
        let mut interp = Interpreter::new().unwrap();
        assert!(matches!(
            interp.eval_str("(CAR (QUOTE A))"),
            Err(LispError::Type(_))
        ));
    }

    #[test]
    fn atom_is_true_for_everything_but_cons() {
        assert_eq!(eval_print("(ATOM (QUOTE A))"), "T");
        assert_eq!(eval_print("(ATOM NIL)"), "T");
        assert_eq!(eval_print("(ATOM 3)"), "T");
        assert_eq!(eval_print("(ATOM \"s\")"), "T");
        assert_eq!(eval_print("(ATOM (CONS 1 2))"), "NIL");
    }

    #[test]
    fn eq_compares_atoms_by_value_and_cons_by_identity() {
        assert_eq!(eval_print("(EQ (QUOTE A) (QUOTE A))"), "T");
        assert_eq!(eval_print("(EQ (QUOTE A) (QUOTE B))"), "NIL");
        assert_eq!(eval_print("(EQ 12 12)"), "T");
        assert_eq!(eval_print("(EQ \"ab\" \"ab\")"), "T");
        assert_eq!(eval_print("(EQ NIL NIL)"), "T");
        assert_eq!(eval_print("(EQ (CONS 1 NIL) (CONS 1 NIL))"), "NIL");
        assert_eq!(
            eval_print("((LAMBDA (X) (EQ X X)) (CONS 1 NIL))"),
            "T"
        );
        assert_eq!(eval_print("(EQ 1 (QUOTE A))"), "NIL");
    }

    #[test]
    fn assoc_returns_value_of_first_match() {
        assert_eq!(
            eval_print("(ASSOC (QUOTE B) (QUOTE ((A 1) (B 2) (C 3))))"),
            "2"
        );
        assert_eq!(eval_print("(ASSOC (QUOTE Z) (QUOTE ((A 1))))"), "NIL");
        assert_eq!(
            eval_print("(ASSOC (QUOTE A) (CONS (CONS (QUOTE A) 5) NIL))"),
            "5"
        );
    }

    #[test]
    fn pair_zips_and_truncates() {
        assert_eq!(
            eval_print("(PAIR (QUOTE (A B)) (QUOTE (1 2)))"),
            "((A 1) (B 2))"
        );
        assert_eq!(
            eval_print("(PAIR (QUOTE (A B C)) (QUOTE (1)))"),
            "((A 1))"
        );
        assert_eq!(eval_print("(PAIR NIL (QUOTE (1)))"), "NIL");
    }

    #[test]
    fn list_is_variadic() {
        assert_eq!(eval_print("(LIST)"), "NIL");
        assert_eq!(eval_print("(LIST 1 (QUOTE A) \"s\")"), "(1 A s)");
    }

    #[test]
    fn lookup_by_name() {
        let id = lookup("ASSOC").unwrap();
        assert_eq!(native_name(id), "ASSOC");
        assert_eq!(native(id).map(|n| n.arity), Some(2));
        assert!(lookup("cons").is_none());
    }
}
