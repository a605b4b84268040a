use crate::heap::Heap;
use crate::primitives;
use crate::symbol::SymbolTable;
use crate::value::Value;

const MAX_PRINT_DEPTH: usize = 1000;

/// Print a value to a string. String contents are emitted raw, so any
/// invalid UTF-8 is replaced.
pub fn print_value(heap: &Heap, symbols: &SymbolTable, val: Value) -> String {
    let mut out = Vec::new();
    write_value(heap, symbols, val, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// Append the printed form of a value to a byte buffer.
pub fn write_value(heap: &Heap, symbols: &SymbolTable, val: Value, out: &mut Vec<u8>) {
    print_inner(val, heap, symbols, out, 0);
}

fn print_inner(val: Value, heap: &Heap, symbols: &SymbolTable, out: &mut Vec<u8>, depth: usize) {
    if depth > MAX_PRINT_DEPTH {
        out.extend_from_slice(b"...");
        return;
    }

    match val {
        Value::Nil => out.extend_from_slice(b"NIL"),
        Value::Symbol(id) => out.extend_from_slice(symbols.name(id)),
        Value::Integer(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::Str(id) => out.extend_from_slice(heap.str_bytes(id)),
        Value::Lambda(_) => out.extend_from_slice(b"#<Lambda>"),
        Value::Macro(_) => out.extend_from_slice(b"#<Macro>"),
        Value::Native(id) => {
            out.extend_from_slice(b"#<Function ");
            out.extend_from_slice(primitives::native_name(id).as_bytes());
            out.push(b'>');
        }
        Value::Stream(_) => out.extend_from_slice(b"#<Stream>"),
        Value::Pair(id) => {
            out.push(b'(');
            print_inner(heap.car(id), heap, symbols, out, depth + 1);

            let mut current = heap.cdr(id);
            loop {
                match current {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        out.push(b' ');
                        print_inner(heap.car(next), heap, symbols, out, depth + 1);
                        current = heap.cdr(next);
                    }
                    tail => {
                        out.extend_from_slice(b" . ");
                        print_inner(tail, heap, symbols, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(b')');
        }
    }
}
