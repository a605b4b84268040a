use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::stream::CharStream;
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

/// A reader macro is invoked with the character that triggered it, already
/// consumed from the stream.
pub type ReaderMacro = fn(&mut Reader<'_>, &mut dyn CharStream, u8) -> LispResult<Value>;

/// Maps trigger characters to reader macros. Later entries shadow earlier
/// ones, so installing a temporary macro is a push and removing it is a
/// restore of the saved table.
#[derive(Clone)]
pub struct Readtable {
    entries: Vec<(u8, ReaderMacro)>,
}

impl Readtable {
    pub fn empty() -> Self {
        Readtable {
            entries: Vec::new(),
        }
    }

    pub fn set(&mut self, ch: u8, handler: ReaderMacro) {
        self.entries.push((ch, handler));
    }

    pub fn get(&self, ch: u8) -> Option<ReaderMacro> {
        self.entries
            .iter()
            .rev()
            .find(|(c, _)| *c == ch)
            .map(|&(_, handler)| handler)
    }
}

impl Default for Readtable {
    fn default() -> Self {
        let mut table = Readtable::empty();
        table.set(b'(', read_list);
        table.set(b')', read_close_paren);
        table.set(b'"', read_string);
        table.set(b'\'', read_quote);
        table.set(b'`', read_backquote);
        table
    }
}

/// Parses source text from a stream into heap values, dispatching on the
/// readtable.
pub struct Reader<'a> {
    pub heap: &'a mut Heap,
    pub symbols: &'a mut SymbolTable,
    pub readtable: &'a mut Readtable,
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | 0x0c)
}

fn is_delimiter(ch: u8) -> bool {
    is_whitespace(ch) || ch == b'(' || ch == b')'
}

impl<'a> Reader<'a> {
    pub fn new(
        heap: &'a mut Heap,
        symbols: &'a mut SymbolTable,
        readtable: &'a mut Readtable,
    ) -> Self {
        Reader {
            heap,
            symbols,
            readtable,
        }
    }

    /// Read one form. Returns None at a clean end of input.
    pub fn read(&mut self, stream: &mut dyn CharStream) -> LispResult<Option<Value>> {
        match self.skip_whitespace_and_comments(stream)? {
            None => Ok(None),
            Some(ch) => self.dispatch(stream, ch).map(Some),
        }
    }

    /// Read one form where end of input is an error.
    pub fn read_form(&mut self, stream: &mut dyn CharStream) -> LispResult<Value> {
        self.read(stream)?
            .ok_or_else(|| LispError::Parse("unexpected end of input".into()))
    }

    /// Read every form until end of input.
    pub fn read_all(&mut self, stream: &mut dyn CharStream) -> LispResult<Vec<Value>> {
        let mut forms = Vec::new();
        while let Some(form) = self.read(stream)? {
            forms.push(form);
        }
        Ok(forms)
    }

    /// Skip whitespace and `;` comments, returning the first significant
    /// character (consumed) or None at end of input.
    fn skip_whitespace_and_comments(
        &mut self,
        stream: &mut dyn CharStream,
    ) -> LispResult<Option<u8>> {
        loop {
            match stream.read_char()? {
                None => return Ok(None),
                Some(ch) if is_whitespace(ch) => {}
                Some(b';') => loop {
                    match stream.read_char()? {
                        None => return Ok(None),
                        Some(b'\n') => break,
                        Some(_) => {}
                    }
                },
                Some(ch) => return Ok(Some(ch)),
            }
        }
    }

    fn dispatch(&mut self, stream: &mut dyn CharStream, ch: u8) -> LispResult<Value> {
        match self.readtable.get(ch) {
            Some(handler) => handler(self, stream, ch),
            None => self.read_token(stream, ch),
        }
    }

    /// Accumulate a token up to whitespace or a parenthesis.
    fn read_token(&mut self, stream: &mut dyn CharStream, first: u8) -> LispResult<Value> {
        let mut token = vec![first];
        while let Some(ch) = stream.read_char()? {
            if is_delimiter(ch) {
                stream.unread_char(ch);
                break;
            }
            token.push(ch);
        }
        self.parse_atom(&token)
    }

    fn parse_atom(&mut self, token: &[u8]) -> LispResult<Value> {
        if token.iter().all(u8::is_ascii_digit) {
            let text = String::from_utf8_lossy(token);
            return text
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| LispError::Parse(format!("integer out of range: {}", text)));
        }
        if token == b"NIL" {
            return Ok(Value::Nil);
        }
        Ok(Value::Symbol(self.symbols.intern(token)))
    }

    fn wrap(&mut self, head: Value, form: Value) -> LispResult<Value> {
        self.heap.list(&[head, form])
    }
}

fn read_list(reader: &mut Reader<'_>, stream: &mut dyn CharStream, _ch: u8) -> LispResult<Value> {
    let mut elements = Vec::new();
    loop {
        match reader.skip_whitespace_and_comments(stream)? {
            None => return Err(LispError::Parse("unterminated list".into())),
            Some(b')') => break,
            Some(ch) => elements.push(reader.dispatch(stream, ch)?),
        }
    }
    reader.heap.list(&elements)
}

fn read_close_paren(_: &mut Reader<'_>, _: &mut dyn CharStream, _: u8) -> LispResult<Value> {
    Err(LispError::Parse("unexpected ')'".into()))
}

fn read_string(reader: &mut Reader<'_>, stream: &mut dyn CharStream, _ch: u8) -> LispResult<Value> {
    let mut bytes = Vec::new();
    loop {
        match stream.read_char()? {
            None => return Err(LispError::Parse("unterminated string".into())),
            Some(b'"') => break,
            Some(b'\\') => match stream.read_char()? {
                None => return Err(LispError::Parse("unterminated string".into())),
                Some(escaped) => bytes.push(escaped),
            },
            Some(ch) => bytes.push(ch),
        }
    }
    reader.heap.alloc_str(&bytes)
}

fn read_quote(reader: &mut Reader<'_>, stream: &mut dyn CharStream, _ch: u8) -> LispResult<Value> {
    let form = reader.read_form(stream)?;
    reader.wrap(Value::Symbol(sym::QUOTE), form)
}

fn read_unquote(reader: &mut Reader<'_>, stream: &mut dyn CharStream, _ch: u8) -> LispResult<Value> {
    let form = reader.read_form(stream)?;
    reader.wrap(Value::Symbol(sym::UNQUOTE), form)
}

/// `` `a `` reads as `(QUOTE a)`; `` `(e1 ,e2) `` reads as a list where each
/// unquoted element is kept and every other element is quoted.
fn read_backquote(
    reader: &mut Reader<'_>,
    stream: &mut dyn CharStream,
    _ch: u8,
) -> LispResult<Value> {
    let saved = reader.readtable.clone();
    reader.readtable.set(b',', read_unquote);
    let result = reader.read_form(stream);
    *reader.readtable = saved;
    let form = result?;

    if form.is_atom() {
        return reader.wrap(Value::Symbol(sym::QUOTE), form);
    }

    let elements: Vec<Value> = reader.heap.iter(form).collect();
    let mut expanded = Vec::with_capacity(elements.len());
    for element in elements {
        match unquoted(reader.heap, element) {
            Some(inner) => expanded.push(inner),
            None => expanded.push(reader.wrap(Value::Symbol(sym::QUOTE), element)?),
        }
    }
    reader.heap.list(&expanded)
}

/// The `f` of an `(UNQUOTE f)` form.
fn unquoted(heap: &Heap, form: Value) -> Option<Value> {
    let id = form.as_pair()?;
    if heap.car(id) != Value::Symbol(sym::UNQUOTE) {
        return None;
    }
    let rest = heap.cdr(id).as_pair()?;
    Some(heap.car(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_value;
    use crate::stream::MemoryStream;
    use pretty_assertions::assert_eq;

    struct Fixture {
        heap: Heap,
        symbols: SymbolTable,
        readtable: Readtable,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                heap: Heap::new(4096),
                symbols: SymbolTable::new(),
                readtable: Readtable::default(),
            }
        }

        fn read_all(&mut self, src: impl Into<Vec<u8>>) -> LispResult<Vec<Value>> {
            let mut stream = MemoryStream::new(src);
            let mut reader = Reader::new(&mut self.heap, &mut self.symbols, &mut self.readtable);
            reader.read_all(&mut stream)
        }

        fn read_printed(&mut self, src: &str) -> String {
            let forms = self.read_all(src).unwrap();
            forms
                .iter()
                .map(|&v| print_value(&self.heap, &self.symbols, v))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    #[test]
    fn reads_atoms() {
        let mut f = Fixture::new();
        let forms = f.read_all("42 NIL foo Bar").unwrap();
        assert_eq!(forms[0], Value::Integer(42));
        assert_eq!(forms[1], Value::Nil);
        assert_eq!(f.symbols.name(forms[2].as_symbol().unwrap()), b"foo");
        assert_eq!(f.symbols.name(forms[3].as_symbol().unwrap()), b"Bar");
    }

    #[test]
    fn symbol_names_keep_their_raw_bytes() {
        let mut f = Fixture::new();
        let forms = f.read_all(&b"\xff \xfe \xff"[..]).unwrap();
        assert_ne!(forms[0], forms[1]);
        assert_eq!(forms[0], forms[2]);
        assert_eq!(f.symbols.name(forms[1].as_symbol().unwrap()), &[0xfeu8][..]);

        let mut out = Vec::new();
        crate::printer::write_value(&f.heap, &f.symbols, forms[0], &mut out);
        assert_eq!(out, vec![0xffu8]);
    }

    #[test]
    fn reads_nested_lists_and_empty_list() {
        let mut f = Fixture::new();
        assert_eq!(f.read_printed("(A (B C) () D)"), "(A (B C) NIL D)");
        assert_eq!(f.read_all("()").unwrap(), vec![Value::Nil]);
    }

    #[test]
    fn tokens_stop_at_parentheses() {
        let mut f = Fixture::new();
        assert_eq!(f.read_printed("(A(B)C)"), "(A (B) C)");
    }

    #[test]
    fn skips_comments() {
        let mut f = Fixture::new();
        assert_eq!(f.read_printed("; header\n(A ; inline\n B)"), "(A B)");
    }

    #[test]
    fn reads_strings_with_escapes() {
        let mut f = Fixture::new();
        let forms = f.read_all(r#""say \"hi\"""#).unwrap();
        match forms[0] {
            Value::Str(id) => assert_eq!(f.heap.str_bytes(id), b"say \"hi\""),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn quote_wraps_next_form() {
        let mut f = Fixture::new();
        assert_eq!(f.read_printed("'A '(B C)"), "(QUOTE A) (QUOTE (B C))");
    }

    #[test]
    fn backquote_quotes_all_but_unquoted_elements() {
        let mut f = Fixture::new();
        assert_eq!(f.read_printed("`(CONS ,X Y)"), "((QUOTE CONS) X (QUOTE Y))");
        assert_eq!(f.read_printed("`A"), "(QUOTE A)");
    }

    #[test]
    fn comma_is_ordinary_outside_backquote() {
        let mut f = Fixture::new();
        f.read_all("`(A ,B)").unwrap();
        let forms = f.read_all(",X").unwrap();
        assert_eq!(f.symbols.name(forms[0].as_symbol().unwrap()), b",X");
    }

    #[test]
    fn readtable_is_restored_after_backquote_error() {
        let mut f = Fixture::new();
        assert!(f.read_all("`(A ,B").is_err());
        assert!(f.readtable.get(b',').is_none());
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        let mut f = Fixture::new();
        assert!(matches!(f.read_all("(A B"), Err(LispError::Parse(_))));
        assert!(matches!(f.read_all(")"), Err(LispError::Parse(_))));
        assert!(matches!(f.read_all("\"open"), Err(LispError::Parse(_))));
        assert!(matches!(f.read_all("'"), Err(LispError::Parse(_))));
        assert!(matches!(
            f.read_all("99999999999999999999"),
            Err(LispError::Parse(_))
        ));
    }

    #[test]
    fn clean_end_of_input_reads_none() {
        let mut f = Fixture::new();
        let mut stream = MemoryStream::new("   ; only a comment");
        let mut reader = Reader::new(&mut f.heap, &mut f.symbols, &mut f.readtable);
        assert_eq!(reader.read(&mut stream), Ok(None));
    }
}
