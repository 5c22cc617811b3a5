use crate::codec::CodecOutcome;

/// Staging area between a native codec and a byte stream.
///
/// Codecs append output to the writable window and mark it with
/// [`written`](Buffer::written). Adapters drain the pending bytes with
/// [`commit`](Buffer::commit), either into the caller's stream (writers) or
/// straight into the caller's slice (readers, where the buffer wraps that
/// slice).
pub trait Buffer {
    /// Space the codec may write into next.
    fn writable(&mut self) -> &mut [u8];

    /// Record that `len` bytes at the start of [`writable`](Buffer::writable)
    /// now hold output.
    ///
    /// Panics if `len` is larger than the writable window.
    fn written(&mut self, len: usize);

    /// Output that has been written but not yet drained.
    fn uncommitted(&self) -> &[u8];

    /// Drain `len` bytes from the front of
    /// [`uncommitted`](Buffer::uncommitted).
    ///
    /// Panics if `len` is larger than the pending output.
    fn commit(&mut self, len: usize);

    /// Drop all pending output.
    fn clear(&mut self);
}

/// A [Buffer] over fixed storage (an array, a `Vec` or a borrowed slice).
///
/// ```plain
/// [ drained | pending (start..end) | free (end..) ]
/// ```
///
/// Both cursors go back to zero as soon as nothing is pending, so a buffer
/// that is drained completely always offers its whole capacity again.
pub struct FixedBuffer<T> {
    storage: T,
    start: usize,
    end: usize,
}

impl<T> FixedBuffer<T> {
    pub fn new(storage: T) -> Self {
        Self {
            storage,
            start: 0,
            end: 0,
        }
    }

    fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

impl FixedBuffer<Vec<u8>> {
    /// Heap-allocated buffer of `capacity` zeroed bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(vec![0; capacity])
    }
}

impl<T> FixedBuffer<T>
where
    T: AsRef<[u8]>,
{
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().len()
    }

    pub fn is_full(&self) -> bool {
        self.end == self.capacity()
    }
}

impl<T> Buffer for FixedBuffer<T>
where
    T: AsRef<[u8]> + AsMut<[u8]>,
{
    fn writable(&mut self) -> &mut [u8] {
        let end = self.end;
        &mut self.storage.as_mut()[end..]
    }

    fn written(&mut self, len: usize) {
        assert!(
            len <= self.capacity() - self.end,
            "wrote past the end of the buffer"
        );
        self.end += len;
    }

    fn uncommitted(&self) -> &[u8] {
        &self.storage.as_ref()[self.start..self.end]
    }

    fn commit(&mut self, len: usize) {
        assert!(
            len <= self.end - self.start,
            "committed more than is pending"
        );
        self.start += len;

        if self.start == self.end {
            self.reset();
        }
    }

    fn clear(&mut self) {
        self.reset();
    }
}

/// Append as much of `src` as fits into `dst`. Returns how many bytes were
/// taken.
pub fn copy_from_slice(src: &[u8], dst: &mut impl Buffer) -> usize {
    let window = dst.writable();
    let len = src.len().min(window.len());

    window[..len].copy_from_slice(&src[..len]);
    dst.written(len);
    len
}

/// Append all of `src` to `dst`. Only for writes known to fit, such as a
/// header into a freshly drained buffer; panics otherwise.
pub fn copy_all_from_slice(src: &[u8], dst: &mut impl Buffer) {
    let copied = copy_from_slice(src, dst);
    assert_eq!(copied, src.len(), "buffer too small for {} bytes", src.len());
}

/// Transfer pending bytes from `src` into free space in `dst`.
/// [`HasMore`](CodecOutcome::HasMore) means `dst` filled up before `src`
/// was drained.
pub fn move_buffer(src: &mut impl Buffer, dst: &mut impl Buffer) -> CodecOutcome<()> {
    let moved = copy_from_slice(src.uncommitted(), dst);
    src.commit(moved);

    if src.uncommitted().is_empty() {
        CodecOutcome::Complete(())
    } else {
        CodecOutcome::HasMore
    }
}

/// Call a native codec function against the writable part of `buffer`.
/// The function returns its result along with the number of bytes it
/// produced, which are then marked as written. Returns the function's
/// output and the number of bytes written.
pub fn fill_writable<R, E>(
    buffer: &mut impl Buffer,
    f: impl FnOnce(&mut [u8]) -> Result<(R, usize), E>,
) -> Result<(R, usize), E> {
    let (result, written) = f(buffer.writable())?;
    buffer.written(written);
    Ok((result, written))
}
