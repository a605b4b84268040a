use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use crate::error::{LispError, LispResult};
use crate::value::StreamId;

/// A byte-oriented character stream with one byte of pushback.
pub trait CharStream {
    /// Next byte, or None at end of input.
    fn read_char(&mut self) -> LispResult<Option<u8>>;

    /// Push a byte back so the next `read_char` returns it.
    fn unread_char(&mut self, ch: u8);

    fn eof(&mut self) -> LispResult<bool>;

    fn write_char(&mut self, ch: u8) -> LispResult<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> LispResult<()> {
        for &b in bytes {
            self.write_char(b)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> LispResult<()> {
        Ok(())
    }

    /// Everything written so far, for in-memory streams.
    fn as_bytes(&self) -> Option<&[u8]> {
        None
    }
}

/// In-memory stream: reads from a fixed buffer, writes append to it.
pub struct MemoryStream {
    data: Vec<u8>,
    pos: usize,
    pushback: Option<u8>,
}

impl MemoryStream {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        MemoryStream {
            data: data.into(),
            pos: 0,
            pushback: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl CharStream for MemoryStream {
    fn read_char(&mut self) -> LispResult<Option<u8>> {
        if let Some(ch) = self.pushback.take() {
            return Ok(Some(ch));
        }
        let ch = self.data.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        Ok(ch)
    }

    fn unread_char(&mut self, ch: u8) {
        self.pushback = Some(ch);
    }

    fn eof(&mut self) -> LispResult<bool> {
        Ok(self.pushback.is_none() && self.pos >= self.data.len())
    }

    fn write_char(&mut self, ch: u8) -> LispResult<()> {
        self.data.push(ch);
        Ok(())
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// Read-only stream over a file.
pub struct FileStream {
    reader: BufReader<File>,
    pushback: Option<u8>,
}

impl FileStream {
    pub fn open(path: &Path) -> LispResult<Self> {
        let file = File::open(path)
            .map_err(|e| LispError::Io(format!("cannot open '{}': {}", path.display(), e)))?;
        Ok(FileStream {
            reader: BufReader::new(file),
            pushback: None,
        })
    }
}

fn read_byte(source: &mut impl Read) -> LispResult<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match source.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

impl CharStream for FileStream {
    fn read_char(&mut self) -> LispResult<Option<u8>> {
        match self.pushback.take() {
            Some(ch) => Ok(Some(ch)),
            None => read_byte(&mut self.reader),
        }
    }

    fn unread_char(&mut self, ch: u8) {
        self.pushback = Some(ch);
    }

    fn eof(&mut self) -> LispResult<bool> {
        if self.pushback.is_some() {
            return Ok(false);
        }
        match read_byte(&mut self.reader)? {
            Some(ch) => {
                self.pushback = Some(ch);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn write_char(&mut self, _ch: u8) -> LispResult<()> {
        Err(LispError::Io("write to input stream".into()))
    }
}

/// Process standard input.
#[derive(Default)]
pub struct StdinStream {
    pushback: Option<u8>,
}

impl CharStream for StdinStream {
    fn read_char(&mut self) -> LispResult<Option<u8>> {
        match self.pushback.take() {
            Some(ch) => Ok(Some(ch)),
            None => read_byte(&mut io::stdin().lock()),
        }
    }

    fn unread_char(&mut self, ch: u8) {
        self.pushback = Some(ch);
    }

    fn eof(&mut self) -> LispResult<bool> {
        if self.pushback.is_some() {
            return Ok(false);
        }
        match read_byte(&mut io::stdin().lock())? {
            Some(ch) => {
                self.pushback = Some(ch);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn write_char(&mut self, _ch: u8) -> LispResult<()> {
        Err(LispError::Io("write to input stream".into()))
    }
}

/// Process standard output. Flushed at every newline.
#[derive(Default)]
pub struct StdoutStream;

impl CharStream for StdoutStream {
    fn read_char(&mut self) -> LispResult<Option<u8>> {
        Err(LispError::Io("read from output stream".into()))
    }

    fn unread_char(&mut self, _ch: u8) {}

    fn eof(&mut self) -> LispResult<bool> {
        Ok(true)
    }

    fn write_char(&mut self, ch: u8) -> LispResult<()> {
        self.write_bytes(&[ch])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> LispResult<()> {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        if bytes.contains(&b'\n') {
            out.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> LispResult<()> {
        io::stdout().flush()?;
        Ok(())
    }
}

/// Manages all open streams.
pub struct StreamTable {
    streams: Vec<Box<dyn CharStream>>,
}

impl StreamTable {
    /// StreamId(0) is stdin, StreamId(1) is stdout.
    pub fn new() -> Self {
        Self::with_stdio(Box::new(StdinStream::default()), Box::new(StdoutStream))
    }

    /// A table whose standard streams are the given backings.
    pub fn with_stdio(input: Box<dyn CharStream>, output: Box<dyn CharStream>) -> Self {
        StreamTable {
            streams: vec![input, output],
        }
    }

    pub fn stdin_id() -> StreamId {
        StreamId(0)
    }

    pub fn stdout_id() -> StreamId {
        StreamId(1)
    }

    /// Register a stream and return its handle.
    pub fn add(&mut self, stream: Box<dyn CharStream>) -> StreamId {
        let id = StreamId(self.streams.len() as u32);
        self.streams.push(stream);
        id
    }

    pub fn open_file(&mut self, path: &Path) -> LispResult<StreamId> {
        let stream = FileStream::open(path)?;
        Ok(self.add(Box::new(stream)))
    }

    pub fn open_memory(&mut self, data: impl Into<Vec<u8>>) -> StreamId {
        self.add(Box::new(MemoryStream::new(data)))
    }

    pub fn get(&mut self, id: StreamId) -> LispResult<&mut dyn CharStream> {
        match self.streams.get_mut(id.0 as usize) {
            Some(stream) => Ok(stream.as_mut()),
            None => Err(LispError::Io(format!("no stream {}", id.0))),
        }
    }
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::new()
    }
}
