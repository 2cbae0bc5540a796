use crate::{
    opcode::{self, Opcode},
    AmlError,
};
use core::fmt;

/// A cursor over a region of AML. All reads are checked against `end` - the end of the innermost enclosing
/// structure (method body, `If` body, package...) rather than the end of the underlying data, so malformed
/// lengths can't make a nested structure read past its container.
#[derive(Clone)]
pub struct AmlStream<'a> {
    data: &'a [u8],
    pc: usize,
    end: usize,
}

impl<'a> AmlStream<'a> {
    pub fn new(data: &'a [u8]) -> AmlStream<'a> {
        AmlStream { data, pc: 0, end: data.len() }
    }

    /// Make a stream over `data[start..end]`. Offsets reported by the stream remain relative to the start of
    /// `data`.
    pub fn with_range(data: &'a [u8], start: usize, end: usize) -> Result<AmlStream<'a>, AmlError> {
        if start > end || end > data.len() {
            return Err(AmlError::InvalidPkgLength);
        }
        Ok(AmlStream { data, pc: start, end })
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn at_end(&self) -> bool {
        self.pc >= self.end
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Restrict the stream to end at `end`, returning the previous end so it can be restored with
    /// [`AmlStream::restore_end`]. `end` may not extend the current region.
    pub fn narrow(&mut self, end: usize) -> Result<usize, AmlError> {
        if end > self.end || end < self.pc {
            return Err(AmlError::InvalidPkgLength);
        }
        Ok(core::mem::replace(&mut self.end, end))
    }

    pub fn restore_end(&mut self, end: usize) {
        self.end = end;
    }

    /// Move the cursor to `offset`, which must lie inside the current region.
    pub fn seek(&mut self, offset: usize) -> Result<(), AmlError> {
        if offset > self.end {
            return Err(AmlError::InvalidPkgLength);
        }
        self.pc = offset;
        Ok(())
    }

    pub fn next(&mut self) -> Result<u8, AmlError> {
        if self.pc >= self.end {
            return Err(AmlError::RunOutOfStream);
        }

        let byte = self.data[self.pc];
        self.pc += 1;

        Ok(byte)
    }

    pub fn next_u16(&mut self) -> Result<u16, AmlError> {
        Ok(u16::from_le_bytes([self.next()?, self.next()?]))
    }

    pub fn next_u32(&mut self) -> Result<u32, AmlError> {
        Ok(u32::from_le_bytes([self.next()?, self.next()?, self.next()?, self.next()?]))
    }

    pub fn next_u64(&mut self) -> Result<u64, AmlError> {
        let bytes = self.take(8)?;
        let mut value = [0; 8];
        value.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(value))
    }

    /// Consume `n` bytes, returning them as a slice of the underlying data.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], AmlError> {
        let end = self.pc.checked_add(n).ok_or(AmlError::RunOutOfStream)?;
        if end > self.end {
            return Err(AmlError::RunOutOfStream);
        }

        let bytes = &self.data[self.pc..end];
        self.pc = end;
        Ok(bytes)
    }

    /// Consume bytes up to (and including) a null terminator, returning the bytes before it.
    pub fn take_null_terminated(&mut self) -> Result<&'a [u8], AmlError> {
        let start = self.pc;
        while self.next()? != b'\0' {}
        Ok(&self.data[start..(self.pc - 1)])
    }

    pub fn peek(&self) -> Result<u8, AmlError> {
        if self.pc >= self.end {
            return Err(AmlError::RunOutOfStream);
        }

        Ok(self.data[self.pc])
    }

    /// Classify the opcode at the cursor without consuming it.
    pub fn peek_opcode(&self) -> Result<(Opcode, usize), AmlError> {
        if self.pc >= self.end {
            return Err(AmlError::RunOutOfStream);
        }
        opcode::decode(&self.data[self.pc..self.end])
    }

    /// Consume the opcode at the cursor and return it.
    pub fn opcode(&mut self) -> Result<Opcode, AmlError> {
        let (opcode, length) = self.peek_opcode()?;
        self.pc += length;
        Ok(opcode)
    }

    /// Consume the next opcode if, and only if, it is `expected`. Returns whether it was consumed. Reaching the
    /// end of the region is not an error here - the opcode is simply not present.
    pub fn expect_opcode(&mut self, expected: Opcode) -> Result<bool, AmlError> {
        if self.at_end() {
            return Ok(false);
        }
        match self.peek_opcode() {
            Ok((opcode, length)) if opcode == expected => {
                self.pc += length;
                Ok(true)
            }
            Ok(_) | Err(AmlError::IllegalOpcode(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for AmlStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PRINT_LEN: usize = 12;

        let upcoming = &self.data[self.pc.min(self.end)..self.end];
        write!(f, "AmlStream {{ pc: {:#x}, end: {:#x}, next: ", self.pc, self.end)?;
        if upcoming.len() > PRINT_LEN {
            write!(f, "{:x?}.. }}", &upcoming[..PRINT_LEN])
        } else {
            write!(f, "{:x?} }}", upcoming)
        }
    }
}
