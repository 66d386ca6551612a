//! Wire format constants and command encoding.
//!
//! Every command sent to the store is a multi-bulk array:
//! ```text
//! *<argc>\r\n
//! $<byte-length>\r\n<argument-bytes>\r\n     (repeated argc times)
//! ```
//!
//! Argument lengths are byte counts, never character counts.

use bytes::{BufMut, Bytes, BytesMut};

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Tag byte for integer replies.
pub const INTEGER_TAG: u8 = b':';

/// Tag byte for bulk strings.
pub const BULK_TAG: u8 = b'$';

/// Tag byte for multi-bulk arrays.
pub const MULTI_BULK_TAG: u8 = b'*';

/// Longest header line (tag excluded) accepted without a terminator.
///
/// An `i64` needs at most 20 characters, so anything longer is garbage.
pub const MAX_LINE_LEN: usize = 32;

/// Default maximum bulk string length (512 MiB, the store's own limit).
pub const DEFAULT_MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Default maximum number of elements in one multi-bulk frame.
pub const DEFAULT_MAX_MULTI_BULK_LEN: usize = 1024 * 1024;

/// Command names for the pub/sub family.
pub mod commands {
    /// `SUBSCRIBE channel [channel ...]`
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    /// `UNSUBSCRIBE [channel ...]`
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    /// `PUBLISH channel message`
    pub const PUBLISH: &str = "PUBLISH";
}

/// A command ready to be serialized.
///
/// # Example
///
/// ```
/// use respwire_client::protocol::Command;
///
/// let wire = Command::new("PUBLISH").arg("chat").arg("hi").encode();
/// assert_eq!(&wire[..], b"*3\r\n$7\r\nPUBLISH\r\n$4\r\nchat\r\n$2\r\nhi\r\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Start a command with its name as the first argument.
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![Bytes::copy_from_slice(name.as_bytes())],
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append a pre-allocated argument without copying.
    pub fn arg_bytes(mut self, arg: Bytes) -> Self {
        self.args.push(arg);
        self
    }

    /// All arguments, command name first.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Exact serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut len = 1 + decimal_len(self.args.len()) + CRLF.len();
        for arg in &self.args {
            len += 1 + decimal_len(arg.len()) + CRLF.len() + arg.len() + CRLF.len();
        }
        len
    }

    /// Serialize into a new buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Serialize into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        encode_command_into(buf, self.args.iter().map(|a| &a[..]));
    }
}

/// Serialize an argument list as a multi-bulk command.
pub fn encode_command<I, A>(args: I) -> Bytes
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();
    let mut buf = BytesMut::new();
    encode_command_into(&mut buf, args.iter().map(AsRef::<[u8]>::as_ref));
    buf.freeze()
}

fn encode_command_into<'a, I>(buf: &mut BytesMut, args: I)
where
    I: ExactSizeIterator<Item = &'a [u8]>,
{
    write_header(buf, MULTI_BULK_TAG, args.len());
    for arg in args {
        write_header(buf, BULK_TAG, arg.len());
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }
}

fn write_header(buf: &mut BytesMut, tag: u8, n: usize) {
    buf.put_u8(tag);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(CRLF);
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
