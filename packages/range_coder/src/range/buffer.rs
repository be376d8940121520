use crate::error::{Error, Result};

/// Fixed-capacity byte arena shared by the two halves of a coded frame.
///
/// Range-coded bytes grow from the front (`offs`) while raw bits grow from
/// the back (`end_offs`). Writes keep `offs + end_offs <= storage`; reads
/// past either end yield zero.
#[derive(Debug, Clone)]
pub struct CodeBuffer<B> {
    buf: B,
    storage: usize,
    offs: usize,
    end_offs: usize,
}

impl<B: AsRef<[u8]>> CodeBuffer<B> {
    pub fn new(buf: B) -> Self {
        let storage = buf.as_ref().len();
        Self {
            buf,
            storage,
            offs: 0,
            end_offs: 0,
        }
    }

    pub const fn storage(&self) -> usize {
        self.storage
    }

    pub const fn offs(&self) -> usize {
        self.offs
    }

    pub const fn end_offs(&self) -> usize {
        self.end_offs
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf.as_ref()[..self.storage]
    }

    pub fn read_byte(&mut self) -> u8 {
        if self.offs < self.storage {
            let byte = self.buf.as_ref()[self.offs];
            self.offs += 1;
            byte
        } else {
            0
        }
    }

    pub fn read_byte_from_end(&mut self) -> u8 {
        if self.end_offs < self.storage {
            self.end_offs += 1;
            self.buf.as_ref()[self.storage - self.end_offs]
        } else {
            0
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> CodeBuffer<B> {
    fn ensure_space(&self) -> Result<()> {
        if self.offs + self.end_offs >= self.storage {
            return Err(Error::BufferFull {
                storage: self.storage,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// * `BufferFull` - when the front and back cursors have met
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.ensure_space()?;
        self.buf.as_mut()[self.offs] = value;
        self.offs += 1;
        Ok(())
    }

    /// # Errors
    ///
    /// * `BufferFull` - when the front and back cursors have met
    pub fn write_byte_at_end(&mut self, value: u8) -> Result<()> {
        self.ensure_space()?;
        self.end_offs += 1;
        let index = self.storage - self.end_offs;
        self.buf.as_mut()[index] = value;
        Ok(())
    }

    pub fn byte_mut(&mut self, index: usize) -> &mut u8 {
        &mut self.buf.as_mut()[..self.storage][index]
    }

    /// Zeroes the unused gap between the two cursors.
    pub fn clear_gap(&mut self) {
        let end = self.storage - self.end_offs;
        self.buf.as_mut()[self.offs..end].fill(0);
    }

    /// Moves the tail bytes so that the frame ends at `size`.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - if `size` cannot hold the bytes already written,
    ///   or exceeds the underlying allocation
    pub fn shrink(&mut self, size: usize) -> Result<()> {
        if self.offs + self.end_offs > size {
            return Err(Error::InvalidArgument(format!(
                "cannot shrink to {size} bytes, {} bytes already written",
                self.offs + self.end_offs
            )));
        }

        let capacity = self.buf.as_ref().len();
        if size > capacity {
            return Err(Error::InvalidArgument(format!(
                "cannot resize to {size} bytes, buffer holds {capacity} bytes"
            )));
        }

        let src = self.storage - self.end_offs;
        self.buf
            .as_mut()
            .copy_within(src..self.storage, size - self.end_offs);
        self.storage = size;

        Ok(())
    }

    pub fn into_inner(self) -> B {
        self.buf
    }
}
