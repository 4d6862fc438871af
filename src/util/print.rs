use std::fmt::{self, Write};

/// Write `bytes` straight to fd 2. Doesn't touch the allocator, so it's fine
/// to call from inside a broken or half-torn-down tracker.
pub fn eputs(bytes: &[u8]) {
    let mut rest = bytes;
    while !rest.is_empty() {
        let n = unsafe { libc::write(libc::STDERR_FILENO, rest.as_ptr().cast(), rest.len()) };
        if n <= 0 {
            return;
        }
        rest = &rest[n as usize..];
    }
}

/// A fixed-size, stack-only line buffer. Anything past the end is dropped.
struct LineBuf {
    buf: [u8; 256],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self {
            buf: [0; 256],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Print `leaktrack: <args>` to stderr without allocating, then abort.
#[cold]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    let mut line = LineBuf::new();
    let _ = line.write_fmt(args);
    eputs(b"leaktrack: ");
    eputs(line.as_bytes());
    eputs(b"\n");
    unsafe { libc::abort() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buf_truncates() {
        let mut line = LineBuf::new();
        write!(line, "{}", "x".repeat(300)).unwrap();
        assert_eq!(line.as_bytes().len(), 256);

        let mut line = LineBuf::new();
        write!(line, "teardown while {:?}", 3).unwrap();
        assert_eq!(line.as_bytes(), b"teardown while 3");
    }
}
