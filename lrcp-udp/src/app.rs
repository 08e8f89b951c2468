//! Line-reversal application.
//!
//! The application sees only the reconstructed inbound byte stream of a
//! session and produces bytes to queue for delivery back to the peer.  It
//! knows nothing about framing, offsets or retransmission:
//!
//! ```text
//!  accepted payload bytes ──▶ LineSplitter ──complete lines──▶ reverse ──▶ outbound bytes
//! ```

// ---------------------------------------------------------------------------
// LineSplitter
// ---------------------------------------------------------------------------

/// Incremental line reassembly.
///
/// Bytes are pushed in whatever pieces they arrive; complete `\n`-terminated
/// lines are handed out in order.  A trailing partial line stays buffered
/// until its terminator arrives and is dropped with the splitter.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append stream bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        match self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let end = self.scanned + i;
                let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                line.pop();
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }

    /// Drain every complete line currently buffered.
    pub fn lines(&mut self) -> impl Iterator<Item = Vec<u8>> + '_ {
        std::iter::from_fn(move || self.next_line())
    }

    /// Bytes of the unterminated line held back.
    pub fn partial_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// LineReversal
// ---------------------------------------------------------------------------

/// The application hosted by every session: each complete input line is
/// answered with the same line reversed.
#[derive(Debug, Default)]
pub struct LineReversal {
    lines: LineSplitter,
}

impl LineReversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed reconstructed stream bytes; returns the output produced, one
    /// entry per completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.lines.push(bytes);
        self.lines.lines().map(|line| reverse_line(&line)).collect()
    }

    /// Bytes of input waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.lines.partial_len()
    }
}

/// Reverse one line (without its terminator) and append `\n`.
///
/// Reversal is byte-for-byte.
pub fn reverse_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend(line.iter().rev());
    out.push(b'\n');
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
