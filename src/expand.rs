use crate::environment;
use crate::error::{LispError, LispResult};
use crate::eval::Interpreter;
use crate::heap::{Heap, Object};
use crate::symbol::sym;
use crate::value::{ObjId, Value};

/// Instantiate a macro template: every occurrence of a parameter symbol in
/// `body` is replaced by the matching argument form. Argument forms are
/// inserted as-is and not walked again.
pub fn instantiate(heap: &mut Heap, params: Value, body: Value, args: Value) -> LispResult<Value> {
    let bindings = environment::pair(heap, params, args)?;
    if bindings.is_nil() {
        return Ok(body);
    }
    substitute(heap, body, bindings)
}

fn substitute(heap: &mut Heap, tree: Value, bindings: Value) -> LispResult<Value> {
    match tree {
        Value::Symbol(_) => match environment::assoc(heap, tree, bindings) {
            Some(entry) => heap.cdr_val(entry).and_then(|rest| heap.car_val(rest)),
            None => Ok(tree),
        },
        Value::Pair(_) => {
            let mut elements = Vec::new();
            let mut current = tree;
            while let Value::Pair(id) = current {
                elements.push(heap.car(id));
                current = heap.cdr(id);
            }
            let mut result = substitute(heap, current, bindings)?;
            for element in elements.into_iter().rev() {
                let element = substitute(heap, element, bindings)?;
                result = heap.cons(element, result)?;
            }
            Ok(result)
        }
        _ => Ok(tree),
    }
}

/// Parameters and template of a macro object.
pub(crate) fn macro_parts(heap: &Heap, id: ObjId) -> Option<(Value, Value)> {
    match *heap.object(id) {
        Object::Macro { params, body } => Some((params, body)),
        _ => None,
    }
}

impl Interpreter {
    /// Expand every macro call in `form` until a pass makes no substitution.
    /// Macro names are looked up in `bindings` (an alist of `(symbol value)`
    /// entries) first, then in the global environment.
    ///
    /// Returns the expanded form and whether anything was substituted.
    pub fn expand(&mut self, form: Value, bindings: Value) -> LispResult<(Value, bool)> {
        let mut budget = self.config.max_expansions;
        let mut form = form;
        let mut expanded = false;
        loop {
            let (next, changed) = self.expand_pass(form, bindings, &mut budget)?;
            form = next;
            if !changed {
                return Ok((form, expanded));
            }
            expanded = true;
        }
    }

    fn expand_pass(
        &mut self,
        form: Value,
        bindings: Value,
        budget: &mut usize,
    ) -> LispResult<(Value, bool)> {
        let id = match form {
            Value::Pair(id) => id,
            _ => return Ok((form, false)),
        };
        let head = self.heap.car(id);
        let args = self.heap.cdr(id);

        if let Value::Symbol(name) = head {
            if name == sym::QUOTE {
                return Ok((form, false));
            }

            if let Some(mac) = self.macro_binding(head, bindings) {
                if *budget == 0 {
                    return Err(LispError::ExpansionLimit(self.config.max_expansions));
                }
                *budget -= 1;

                let (params, body) = macro_parts(&self.heap, mac)
                    .ok_or_else(|| LispError::Type("not a macro".into()))?;
                let replacement = instantiate(&mut self.heap, params, body, args)?;
                log::debug!(
                    "expand {} => {}",
                    self.print(form),
                    self.print(replacement)
                );
                let (replacement, _) = self.expand_pass(replacement, bindings, budget)?;
                return Ok((replacement, true));
            }

            if name == sym::LAMBDA || name == sym::MACRO {
                // Keep the parameter list, walk the body.
                if let Value::Pair(rest) = args {
                    let params = self.heap.car(rest);
                    let body = self.heap.cdr(rest);
                    let (body, changed) = self.expand_elements(body, bindings, budget)?;
                    if !changed {
                        return Ok((form, false));
                    }
                    let tail = self.heap.cons(params, body)?;
                    return Ok((self.heap.cons(head, tail)?, true));
                }
                return Ok((form, false));
            }
        }

        self.expand_elements(form, bindings, budget)
    }

    /// Expand each element of a list, rebuilding it only when something changed.
    fn expand_elements(
        &mut self,
        list: Value,
        bindings: Value,
        budget: &mut usize,
    ) -> LispResult<(Value, bool)> {
        let mut elements = Vec::new();
        let mut current = list;
        while let Value::Pair(id) = current {
            elements.push(self.heap.car(id));
            current = self.heap.cdr(id);
        }

        let mut changed = false;
        let mut expanded = Vec::with_capacity(elements.len());
        for element in elements {
            let (element, element_changed) = self.expand_pass(element, bindings, budget)?;
            changed |= element_changed;
            expanded.push(element);
        }
        if !changed {
            return Ok((list, false));
        }

        let mut result = current;
        for element in expanded.into_iter().rev() {
            result = self.heap.cons(element, result)?;
        }
        Ok((result, true))
    }

    /// The macro object `head` names, if any.
    fn macro_binding(&self, head: Value, bindings: Value) -> Option<ObjId> {
        let bound = match environment::assoc(&self.heap, head, bindings) {
            Some(entry) => self
                .heap
                .cdr_val(entry)
                .and_then(|rest| self.heap.car_val(rest))
                .ok()?,
            None => {
                let name = head.as_symbol()?;
                environment::resolve(&self.heap, self.global_env(), name)?.1
            }
        };
        match bound {
            Value::Macro(id) => Some(id),
            _ => None,
        }
    }
}
