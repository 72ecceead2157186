//! BER encoding.
//!
//! `EncodeBuf` fills in reverse: callers push the innermost content first,
//! then its length, then its tag. This way every constructed length is known
//! exactly when it is written, with a single buffer reversal at the end.

use bytes::Bytes;

use super::length::encode_length;
use super::tag;
use crate::oid::Oid;

/// Reverse-fill BER encode buffer.
///
/// All `push_*` methods prepend, so a message is written back to front.
/// Multi-byte items are pushed in reversed byte order internally and come
/// out forward after [`EncodeBuf::finish`].
pub struct EncodeBuf {
    // Bytes in reverse stream order.
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether anything has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Push a tag byte.
    pub fn push_tag(&mut self, tag: u8) {
        self.buf.push(tag);
    }

    /// Push a length field.
    pub fn push_length(&mut self, len: usize) {
        let (bytes, n) = encode_length(len);
        // encode_length already yields bytes in reverse order
        self.buf.extend_from_slice(&bytes[..n]);
    }

    /// Push raw content bytes (appear in the output in the given order).
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buf.extend(data.iter().rev());
    }

    /// Push a signed INTEGER TLV (minimal two's-complement encoding).
    pub fn push_integer(&mut self, value: i32) {
        let be = value.to_be_bytes();

        // Trim redundant leading bytes while preserving the sign bit.
        let mut start = 0;
        while start < 3 {
            let cur = be[start];
            let next = be[start + 1];
            if (cur == 0x00 && next & 0x80 == 0) || (cur == 0xFF && next & 0x80 != 0) {
                start += 1;
            } else {
                break;
            }
        }

        let content = &be[start..];
        self.push_bytes(content);
        self.push_length(content.len());
        self.push_tag(tag::universal::INTEGER);
    }

    /// Push an unsigned 32-bit TLV with the given application tag.
    ///
    /// A leading zero byte is inserted when the top bit is set, so the value
    /// is never mistaken for a negative integer.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let be = value.to_be_bytes();
        let mut start = 0;
        while start < 3 && be[start] == 0 {
            start += 1;
        }

        let needs_pad = be[start] & 0x80 != 0;
        let len = (4 - start) + usize::from(needs_pad);

        self.push_bytes(&be[start..]);
        if needs_pad {
            self.buf.push(0x00);
        }
        self.push_length(len);
        self.push_tag(tag);
    }

    /// Push a Counter64 TLV.
    pub fn push_integer64(&mut self, value: u64) {
        let be = value.to_be_bytes();
        let mut start = 0;
        while start < 7 && be[start] == 0 {
            start += 1;
        }

        let needs_pad = be[start] & 0x80 != 0;
        let len = (8 - start) + usize::from(needs_pad);

        self.push_bytes(&be[start..]);
        if needs_pad {
            self.buf.push(0x00);
        }
        self.push_length(len);
        self.push_tag(tag::application::COUNTER64);
    }

    /// Push an OCTET STRING TLV.
    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_bytes(data);
        self.push_length(data.len());
        self.push_tag(tag::universal::OCTET_STRING);
    }

    /// Push a NULL TLV.
    pub fn push_null(&mut self) {
        self.push_length(0);
        self.push_tag(tag::universal::NULL);
    }

    /// Push an OBJECT IDENTIFIER TLV.
    pub fn push_oid(&mut self, oid: &Oid) {
        let ber = oid.to_ber_smallvec();
        self.push_bytes(&ber);
        self.push_length(ber.len());
        self.push_tag(tag::universal::OBJECT_IDENTIFIER);
    }

    /// Push an IpAddress TLV.
    pub fn push_ip_address(&mut self, addr: [u8; 4]) {
        self.push_bytes(&addr);
        self.push_length(4);
        self.push_tag(tag::application::IP_ADDRESS);
    }

    /// Push a SEQUENCE wrapping whatever the closure writes.
    ///
    /// The closure must push the sequence contents in reverse field order.
    pub fn push_sequence(&mut self, contents: impl FnOnce(&mut EncodeBuf)) {
        self.push_constructed(tag::universal::SEQUENCE, contents);
    }

    /// Push a constructed TLV with an arbitrary tag.
    pub fn push_constructed(&mut self, tag: u8, contents: impl FnOnce(&mut EncodeBuf)) {
        let before = self.buf.len();
        contents(self);
        let content_len = self.buf.len() - before;
        self.push_length(content_len);
        self.push_tag(tag);
    }

    /// Finish encoding and return the forward-order bytes.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}

impl Default for EncodeBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::Decoder;
    use crate::oid;

    fn finish(buf: EncodeBuf) -> Vec<u8> {
        buf.finish().to_vec()
    }

    #[test]
    fn test_encode_integer_forms() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x02, 0x01, 0x00]),
            (127, &[0x02, 0x01, 0x7F]),
            (128, &[0x02, 0x02, 0x00, 0x80]),
            (-1, &[0x02, 0x01, 0xFF]),
            (-128, &[0x02, 0x01, 0x80]),
            (0x01020304, &[0x02, 0x04, 0x01, 0x02, 0x03, 0x04]),
        ];
        for (value, expected) in cases {
            let mut buf = EncodeBuf::new();
            buf.push_integer(value);
            assert_eq!(finish(buf), expected, "value {value}");
        }
    }

    #[test]
    fn test_encode_unsigned_pads_high_bit() {
        let mut buf = EncodeBuf::new();
        buf.push_unsigned32(tag::application::TIMETICKS, 0x80000000);
        assert_eq!(finish(buf), [0x43, 0x05, 0x00, 0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_sequence_nesting() {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_integer(2);
            buf.push_integer(1);
        });
        assert_eq!(finish(buf), [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn test_integer_roundtrip() {
        for value in [i32::MIN, -65536, -129, -128, -1, 0, 1, 127, 128, 65535, i32::MAX] {
            let mut buf = EncodeBuf::new();
            buf.push_integer(value);
            let mut dec = Decoder::new(buf.finish());
            assert_eq!(dec.read_integer().unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn test_unsigned_roundtrip() {
        for value in [0u32, 1, 127, 128, 255, 65535, 0x7FFFFFFF, 0x80000000, u32::MAX] {
            let mut buf = EncodeBuf::new();
            buf.push_unsigned32(tag::application::GAUGE32, value);
            let mut dec = Decoder::new(buf.finish());
            let len = dec.expect_tag(tag::application::GAUGE32).unwrap();
            assert_eq!(dec.read_unsigned32_value(len).unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn test_counter64_roundtrip() {
        for value in [0u64, 1, u32::MAX as u64, u64::MAX] {
            let mut buf = EncodeBuf::new();
            buf.push_integer64(value);
            let mut dec = Decoder::new(buf.finish());
            let len = dec.expect_tag(tag::application::COUNTER64).unwrap();
            assert_eq!(dec.read_integer64_value(len).unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn test_oid_roundtrip() {
        let oid = oid!(1, 3, 6, 1, 4, 1, 9999, 1, 2);
        let mut buf = EncodeBuf::new();
        buf.push_oid(&oid);
        let mut dec = Decoder::new(buf.finish());
        assert_eq!(dec.read_oid().unwrap(), oid);
    }

    #[test]
    fn test_long_octet_string_gets_long_form_length() {
        let data = vec![0xAB; 200];
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(&data);
        let out = finish(buf);
        assert_eq!(&out[..3], &[0x04, 0x81, 200]);
        assert_eq!(out.len(), 3 + 200);
    }
}
