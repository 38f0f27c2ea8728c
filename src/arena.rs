//! Packing data into a caller-supplied buffer.
//!
//! The name service interface hands us a buffer of fixed size and expects
//! all variable-length data of a result – strings and arrays of strings –
//! to be placed inside it. The [`Arena`] type is a bump allocator over such
//! a buffer. It only ever moves forward and never grows. If a value doesn’t
//! fit, the operation fails with [`ShortBuf`] before anything is written
//! for that value.
//!
//! Packed values are referred to through small handles, [`StrRef`] and
//! [`StrArrayRef`], which store offsets into the buffer rather than
//! pointers. They can be turned back into string slices via the arena or
//! via a new arena over the same buffer once the first one is gone.
//!
//! A failure is terminal for the record being assembled: earlier values of
//! the same record may already have been written, so the whole result has
//! to be discarded and the caller needs to retry with a larger buffer.

use core::{fmt, mem, str};
use octseq::builder::{OctetsBuilder, ShortBuf};

/// The size of a pointer slot in a packed string array.
const SLOT_SIZE: usize = mem::size_of::<usize>();

//------------ Span ----------------------------------------------------------

/// A reserved region of an arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Span {
    start: usize,
    len: usize,
}

impl Span {
    /// Returns the offset of the region from the start of the buffer.
    pub fn start(self) -> usize {
        self.start
    }

    /// Returns the offset of the first octet after the region.
    pub fn end(self) -> usize {
        self.start + self.len
    }

    /// Returns the length of the region.
    pub fn len(self) -> usize {
        self.len
    }

    /// Returns whether the region is empty.
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns whether two regions share at least one octet.
    pub fn overlaps(self, other: Span) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

//------------ StrRef --------------------------------------------------------

/// A NUL-terminated string packed into an arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StrRef {
    /// Offset of the first octet.
    start: usize,

    /// Length of the string without the terminating NUL.
    len: usize,
}

impl StrRef {
    /// Returns the offset of the string from the start of the buffer.
    pub fn offset(self) -> usize {
        self.start
    }

    /// Returns the length of the string without the terminating NUL.
    pub fn len(self) -> usize {
        self.len
    }

    /// Returns whether the string is empty.
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns the region occupied by the string including its NUL.
    pub fn span(self) -> Span {
        Span {
            start: self.start,
            len: self.len + 1,
        }
    }
}

//------------ StrArrayRef ---------------------------------------------------

/// A null-terminated array of string pointers packed into an arena.
///
/// The array consists of pointer-sized slots, each holding the address of a
/// packed string, followed by a zero slot. This is the layout the C
/// library expects for things like the member list of a group.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StrArrayRef {
    /// Offset of the first slot.
    slots: usize,

    /// Number of strings in the array.
    len: usize,
}

impl StrArrayRef {
    /// Returns the offset of the first pointer slot.
    pub fn offset(self) -> usize {
        self.slots
    }

    /// Returns the number of strings in the array.
    pub fn len(self) -> usize {
        self.len
    }

    /// Returns whether the array contains no strings.
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

//------------ Arena ---------------------------------------------------------

/// A bump allocator over a borrowed buffer.
pub struct Arena<'a> {
    /// The caller’s buffer.
    buf: &'a mut [u8],

    /// The number of octets consumed so far.
    pos: usize,
}

impl<'a> Arena<'a> {
    /// Creates a new arena using all of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Arena { buf, pos: 0 }
    }

    /// Returns the total size of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of octets consumed so far.
    ///
    /// This includes padding inserted for alignment.
    pub fn used(&self) -> usize {
        self.pos
    }

    /// Returns the number of octets still available.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the address of the first octet of the buffer.
    pub fn base_addr(&self) -> usize {
        self.buf.as_ptr() as usize
    }

    /// Returns the octets consumed so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Reserves `len` octets aligned to `align`.
    ///
    /// Alignment is relative to the actual memory address, not the offset
    /// into the buffer, so that the region can be used as, say, an array of
    /// pointers. An `align` of zero is treated as one. Padding needed for
    /// alignment is consumed together with the region.
    pub fn reserve(
        &mut self,
        len: usize,
        align: usize,
    ) -> Result<Span, ShortBuf> {
        let align = align.max(1);
        let addr = self.base_addr() + self.pos;
        let pad = (align - addr % align) % align;
        let total = pad.checked_add(len).ok_or(ShortBuf)?;
        if total > self.remaining() {
            return Err(ShortBuf);
        }
        let start = self.pos + pad;
        self.pos += total;
        Ok(Span { start, len })
    }

    /// Returns mutable access to a previously reserved region.
    ///
    /// Returns `None` if the span doesn’t lie within the consumed part of
    /// the buffer.
    pub fn span_mut(&mut self, span: Span) -> Option<&mut [u8]> {
        if span.end() > self.pos {
            return None;
        }
        Some(&mut self.buf[span.start..span.end()])
    }

    /// Copies a string into the arena, adding a terminating NUL.
    ///
    /// Only the part before the first NUL of `value` is copied, which is
    /// all a C caller would see anyway.
    pub fn copy_str(&mut self, value: &str) -> Result<StrRef, ShortBuf> {
        let bytes = value.as_bytes();
        let bytes = match bytes.iter().position(|&ch| ch == 0) {
            Some(len) => &bytes[..len],
            None => bytes,
        };
        let span = self.reserve(bytes.len() + 1, 1)?;
        let target = &mut self.buf[span.start..span.end()];
        target[..bytes.len()].copy_from_slice(bytes);
        target[bytes.len()] = 0;
        Ok(StrRef {
            start: span.start,
            len: bytes.len(),
        })
    }

    /// Copies a list of strings into the arena as a pointer array.
    ///
    /// The pointer slots for all values plus the terminating null slot are
    /// reserved first so the array itself is contiguous. Then each value is
    /// copied, except for those equal to `omit`.
    ///
    /// If the arena runs out of space, values copied before the failure
    /// stay behind. The array must not be used in this case.
    pub fn copy_str_array<S: AsRef<str>>(
        &mut self,
        values: &[S],
        omit: Option<&str>,
    ) -> Result<StrArrayRef, ShortBuf> {
        let slot_count = values.len().checked_add(1).ok_or(ShortBuf)?;
        let slots = self.reserve(
            slot_count.checked_mul(SLOT_SIZE).ok_or(ShortBuf)?,
            mem::align_of::<usize>(),
        )?;
        let mut len = 0;
        for value in values {
            let value = value.as_ref();
            if omit == Some(value) {
                continue;
            }
            let item = self.copy_str(value)?;
            let addr = self.base_addr() + item.start;
            self.write_slot(slots.start, len, addr);
            len += 1;
        }
        for idx in len..slot_count {
            self.write_slot(slots.start, idx, 0);
        }
        Ok(StrArrayRef {
            slots: slots.start,
            len,
        })
    }

    /// Writes the address into slot `idx` of the array starting at `start`.
    fn write_slot(&mut self, start: usize, idx: usize, addr: usize) {
        let pos = start + idx * SLOT_SIZE;
        self.buf[pos..pos + SLOT_SIZE].copy_from_slice(&addr.to_ne_bytes());
    }

    /// Reads slot `idx` of the array starting at `start`.
    fn read_slot(&self, start: usize, idx: usize) -> Option<usize> {
        let pos = start + idx * SLOT_SIZE;
        let mut octets = [0u8; SLOT_SIZE];
        octets.copy_from_slice(self.buf.get(pos..pos + SLOT_SIZE)?);
        Some(usize::from_ne_bytes(octets))
    }

    /// Returns a packed string.
    ///
    /// Returns `None` if the handle doesn’t refer to a valid string in this
    /// arena.
    pub fn get_str(&self, item: StrRef) -> Option<&str> {
        let octets = self.buf.get(item.start..item.start + item.len)?;
        str::from_utf8(octets).ok()
    }

    /// Returns an iterator over the strings of a packed array.
    pub fn get_str_array(&self, array: StrArrayRef) -> StrArrayIter<'_, 'a> {
        StrArrayIter {
            arena: self,
            array,
            idx: 0,
        }
    }

    /// Returns the NUL-terminated string starting at the given address.
    fn str_at_addr(&self, addr: usize) -> Option<&str> {
        let start = addr.checked_sub(self.base_addr())?;
        let tail = self.buf.get(start..)?;
        let len = tail.iter().position(|&ch| ch == 0)?;
        str::from_utf8(&tail[..len]).ok()
    }
}

//--- OctetsBuilder

impl<'a> OctetsBuilder for Arena<'a> {
    type AppendError = ShortBuf;

    fn append_slice(&mut self, slice: &[u8]) -> Result<(), Self::AppendError> {
        let span = self.reserve(slice.len(), 1)?;
        self.buf[span.start..span.end()].copy_from_slice(slice);
        Ok(())
    }
}

//--- Debug

impl<'a> fmt::Debug for Arena<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("used", &self.pos)
            .finish()
    }
}

//------------ StrArrayIter --------------------------------------------------

/// An iterator over the strings of a packed string array.
pub struct StrArrayIter<'r, 'a> {
    arena: &'r Arena<'a>,
    array: StrArrayRef,
    idx: usize,
}

impl<'r, 'a> Iterator for StrArrayIter<'r, 'a> {
    type Item = &'r str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.array.len {
            return None;
        }
        let addr = self.arena.read_slot(self.array.slots, self.idx)?;
        if addr == 0 {
            return None;
        }
        self.idx += 1;
        self.arena.str_at_addr(addr)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_str_advances_by_len_plus_one() {
        let mut buf = [0xAAu8; 32];
        let mut arena = Arena::new(&mut buf);
        let alice = arena.copy_str("alice").unwrap();
        assert_eq!(arena.used(), "alice".len() + 1);
        assert_eq!(arena.remaining(), 32 - 6);
        assert_eq!(arena.get_str(alice), Some("alice"));
        drop(arena);
        assert_eq!(&buf[..6], b"alice\0");
        assert_eq!(buf[6], 0xAA);
    }

    #[test]
    fn copy_str_one_short_writes_nothing() {
        let mut buf = [0xAAu8; 5];
        let mut arena = Arena::new(&mut buf);
        assert_eq!(arena.copy_str("alice"), Err(ShortBuf));
        assert_eq!(arena.remaining(), 5);
        drop(arena);
        assert_eq!(buf, [0xAA; 5]);
    }

    #[test]
    fn reservations_are_monotonic_and_disjoint() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        let mut spans = Vec::new();
        let mut remaining = arena.remaining();
        for (len, align) in [(3, 1), (8, 8), (1, 1), (5, 4), (16, 16), (0, 2)]
        {
            let span = arena.reserve(len, align).unwrap();
            assert!(arena.remaining() <= remaining);
            assert_eq!((arena.base_addr() + span.start()) % align, 0);
            remaining = arena.remaining();
            spans.push(span);
        }
        for (i, left) in spans.iter().enumerate() {
            for right in &spans[i + 1..] {
                assert!(!left.overlaps(*right));
            }
        }
    }

    #[test]
    fn reserve_counts_padding() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::new(&mut buf);
        arena.reserve(1, 1).unwrap();
        let span = arena.reserve(8, 8).unwrap();
        assert_eq!(arena.used(), span.end());
    }

    #[test]
    fn copy_str_array_layout() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::new(&mut buf);
        let members = ["alice", "root", "bob"];
        let array = arena.copy_str_array(&members, Some("root")).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(
            (arena.base_addr() + array.offset()) % mem::align_of::<usize>(),
            0
        );
        let values: Vec<_> = arena.get_str_array(array).collect();
        assert_eq!(values, ["alice", "bob"]);

        // Slots for all three values and the sentinel come first.
        let first = arena.read_slot(array.offset(), 0).unwrap();
        assert_eq!(
            first - arena.base_addr(),
            array.offset() + 4 * SLOT_SIZE
        );
        assert_eq!(arena.read_slot(array.offset(), 2), Some(0));
        assert_eq!(arena.read_slot(array.offset(), 3), Some(0));
    }

    #[test]
    fn resolve_through_new_arena() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::new(&mut buf);
        let name = arena.copy_str("wheel").unwrap();
        let members = arena.copy_str_array(&["alice", "bob"], None).unwrap();
        drop(arena);
        let arena = Arena::new(&mut buf);
        assert_eq!(arena.get_str(name), Some("wheel"));
        let values: Vec<_> = arena.get_str_array(members).collect();
        assert_eq!(values, ["alice", "bob"]);
    }

    #[test]
    fn copy_empty_str_array() {
        let mut buf = [0u8; 32];
        let mut arena = Arena::new(&mut buf);
        let array = arena.copy_str_array::<&str>(&[], None).unwrap();
        assert!(array.is_empty());
        assert_eq!(arena.get_str_array(array).count(), 0);
        assert_eq!(arena.read_slot(array.offset(), 0), Some(0));
    }

    #[test]
    fn copy_str_array_without_room_for_slots() {
        let mut buf = [0u8; 2 * SLOT_SIZE];
        let mut arena = Arena::new(&mut buf);
        let used = arena.used();
        assert_eq!(
            arena.copy_str_array(&["a", "b", "c"], None),
            Err(ShortBuf)
        );
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn copy_str_array_runs_out_midway() {
        let mut buf = [0u8; 64];
        let mut arena = Arena::new(&mut buf);
        let long = "x".repeat(40);
        assert_eq!(
            arena.copy_str_array(&["short", long.as_str()], None),
            Err(ShortBuf)
        );
    }

    #[test]
    fn interior_nul_truncates() {
        let mut buf = [0xAAu8; 32];
        let mut arena = Arena::new(&mut buf);
        let name = arena.copy_str("ali\0ce").unwrap();
        assert_eq!(name.len(), 3);
        assert_eq!(arena.used(), 4);
        assert_eq!(arena.get_str(name), Some("ali"));
        let array = arena.copy_str_array(&["b\0ob"], None).unwrap();
        let values: Vec<_> = arena.get_str_array(array).collect();
        assert_eq!(values, ["b"]);
        drop(arena);
        assert_eq!(&buf[..4], b"ali\0");
    }

    #[test]
    fn write_into_reserved_span() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        let span = arena.reserve(4, 1).unwrap();
        arena.span_mut(span).unwrap().copy_from_slice(b"uid\0");
        assert_eq!(arena.as_slice(), b"uid\0");

        // Spans beyond what was consumed are refused.
        let unreserved = Span { start: 4, len: 2 };
        assert!(arena.span_mut(unreserved).is_none());
    }

    #[test]
    fn append_slice() {
        let mut buf = [0u8; 4];
        let mut arena = Arena::new(&mut buf);
        arena.append_slice(b"ab").unwrap();
        assert_eq!(arena.append_slice(b"cde"), Err(ShortBuf));
        assert_eq!(arena.as_slice(), b"ab");
    }
}
