use crate::command::{Stdin, Stdout};
use std::cell::RefCell;
use std::io::{Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::rc::Rc;

/// Memory-backed reader: the output of one pipeline stage becomes the input
/// of the next.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    fn stdio(&mut self) -> Option<Stdio> {
        None
    }
}

/// Memory-backed writer for capturing the stdout of a command.
///
/// The buffer is shared, so the caller keeps a handle and reads the bytes
/// after the command has consumed the writer.
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::from_handle(Rc::new(RefCell::new(Vec::new())))
    }

    /// Append to an existing shared buffer.
    pub fn from_handle(buf: Rc<RefCell<Vec<u8>>>) -> Self {
        Self { buf }
    }

    /// Convenience: create writer and return (writer, rc_handle).
    pub fn with_handle() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let mw = MemWriter::new();
        let rc = mw.buf.clone();
        (mw, rc)
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(&mut self) -> Option<Stdio> {
        None
    }
}

/// The shell's own standard input, handed to commands that read the terminal.
pub struct InheritedStdin;

impl Read for InheritedStdin {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        std::io::stdin().read(out)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(&mut self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}
