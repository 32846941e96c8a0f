//! Bounded output sink with a truncation marker.

use std::io::Write;

/// Wraps a byte sink and caps how much payload reaches it.
///
/// Once cumulative payload would exceed `max_bytes`, the limiter writes the
/// bytes that still fit, emits a single truncation marker, and silently
/// discards everything after that — while still counting the discarded bytes
/// so the marker and [`remaining_bytes`](Self::remaining_bytes) can report
/// how much was dropped.
///
/// Writes always report full acceptance and never fail on overflow, so a
/// producing child process never sees back-pressure or an EPIPE-like error
/// from throttling.
///
/// A `max_bytes` of zero disables limiting entirely.
#[derive(Debug)]
pub struct OutputLimiter<W> {
    inner: W,
    max_bytes: usize,
    written: usize,
    total_input: usize,
    truncated: bool,
}

impl<W: Write> OutputLimiter<W> {
    /// Create a limiter over `inner` that passes through at most `max_bytes`
    /// of payload (0 = unbounded).
    pub fn new(inner: W, max_bytes: usize) -> Self {
        Self {
            inner,
            max_bytes,
            written: 0,
            total_input: 0,
            truncated: false,
        }
    }

    /// Whether the marker has been emitted and input is being discarded.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Number of input bytes that never reached the sink.
    pub fn remaining_bytes(&self) -> usize {
        if !self.truncated {
            return 0;
        }
        self.total_input - self.written
    }

    /// Total bytes offered by the producer, accepted or not.
    pub fn total_input_bytes(&self) -> usize {
        self.total_input
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap into the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn truncation_marker(&self) -> String {
        format!(
            "\n\n[Output truncated, exceeded {} bytes limit. {} bytes remaining]\n",
            self.max_bytes,
            self.total_input - self.written
        )
    }
}

impl<W: Write> Write for OutputLimiter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.total_input += buf.len();

        if self.max_bytes == 0 {
            self.written += buf.len();
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }

        if self.truncated {
            return Ok(buf.len());
        }

        let remaining = self.max_bytes - self.written;
        if remaining == 0 {
            // Limit was reached exactly by an earlier write.
            let marker = self.truncation_marker();
            let _ = self.inner.write_all(marker.as_bytes());
            self.truncated = true;
            return Ok(buf.len());
        }

        if buf.len() > remaining {
            self.inner.write_all(&buf[..remaining])?;
            self.written += remaining;
            self.truncated = true;
            let marker = self.truncation_marker();
            let _ = self.inner.write_all(marker.as_bytes());
            return Ok(buf.len());
        }

        self.inner.write_all(buf)?;
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_passes_through() {
        let mut limiter = OutputLimiter::new(Vec::new(), 100);

        let written = limiter.write(b"hello world").unwrap();
        assert_eq!(written, 11);
        assert!(!limiter.truncated());
        assert_eq!(limiter.remaining_bytes(), 0);
        assert_eq!(limiter.get_ref(), b"hello world");
    }

    #[test]
    fn test_exactly_at_limit_is_not_truncated() {
        let mut limiter = OutputLimiter::new(Vec::new(), 5);

        let written = limiter.write(b"hello").unwrap();
        assert_eq!(written, 5);
        assert!(!limiter.truncated());
        assert_eq!(limiter.get_ref(), b"hello");
    }

    #[test]
    fn test_over_limit_writes_marker() {
        let mut limiter = OutputLimiter::new(Vec::new(), 5);

        // Reports full length even though only 5 payload bytes land.
        let written = limiter.write(b"hello world").unwrap();
        assert_eq!(written, 11);
        assert!(limiter.truncated());
        assert_eq!(limiter.remaining_bytes(), 6);

        let content = String::from_utf8(limiter.into_inner()).unwrap();
        assert!(content.starts_with("hello"));
        assert!(content.contains("[Output truncated, exceeded 5 bytes limit. 6 bytes remaining]"));
    }

    #[test]
    fn test_writes_after_truncation_are_counted_not_written() {
        let mut limiter = OutputLimiter::new(Vec::new(), 5);

        limiter.write(b"hello world").unwrap();
        let len_after_marker = limiter.get_ref().len();

        let written = limiter.write(b"more data").unwrap();
        assert_eq!(written, 9);
        assert_eq!(limiter.get_ref().len(), len_after_marker);
        assert_eq!(limiter.remaining_bytes(), 6 + 9);
    }

    #[test]
    fn test_limit_reached_on_exact_boundary_then_more() {
        let mut limiter = OutputLimiter::new(Vec::new(), 10);

        limiter.write(b"12345").unwrap();
        limiter.write(b"67890").unwrap();
        assert!(!limiter.truncated());

        // The next write finds no room left; marker goes out once.
        limiter.write(b"x").unwrap();
        assert!(limiter.truncated());
        assert_eq!(limiter.remaining_bytes(), 1);

        let content = String::from_utf8(limiter.into_inner()).unwrap();
        assert!(content.starts_with("1234567890"));
        assert_eq!(content.matches("[Output truncated").count(), 1);
    }

    #[test]
    fn test_byte_accounting_invariant() {
        let mut limiter = OutputLimiter::new(Vec::new(), 8);

        limiter.write(b"abcdefghij").unwrap();
        limiter.write(b"klmno").unwrap();

        // Payload into the sink + discarded bytes add up to total input,
        // and the sink holds exactly max_bytes of payload plus one marker.
        assert_eq!(limiter.total_input_bytes(), 15);
        assert_eq!(limiter.remaining_bytes(), 7);
        let marker_len =
            "\n\n[Output truncated, exceeded 8 bytes limit. 2 bytes remaining]\n".len();
        assert_eq!(limiter.get_ref().len(), 8 + marker_len);
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let mut limiter = OutputLimiter::new(Vec::new(), 0);

        let payload = vec![b'a'; 4096];
        limiter.write(&payload).unwrap();
        limiter.write(&payload).unwrap();

        assert!(!limiter.truncated());
        assert_eq!(limiter.remaining_bytes(), 0);
        assert_eq!(limiter.get_ref().len(), 8192);
    }

    #[test]
    fn test_io_write_trait() {
        let mut limiter = OutputLimiter::new(Vec::new(), 100);

        writeln!(limiter, "hello {}", "world").unwrap();
        limiter.flush().unwrap();

        assert!(limiter.get_ref().starts_with(b"hello world\n"));
    }
}
