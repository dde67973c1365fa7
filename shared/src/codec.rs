//! Bounds-checked byte cursors for the binary wire format.
//!
//! [`Reader`] and [`Writer`] walk a caller-owned buffer. Every access of N
//! bytes requires `position + N <= end`; a violation returns
//! [`CodecError::OutOfBounds`] and leaves the cursor where it was. Nothing
//! here allocates.
//!
//! All multi-byte integers are little-endian. Floats travel as their IEEE-754
//! bit pattern. Colors travel in blue, green, red order.

use crate::math::{IVec3, Vec3};
use crate::types::Color;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer overrun: needed {needed} bytes, {remaining} remaining")]
    OutOfBounds { needed: usize, remaining: usize },
    #[error("invalid {name} value {value}")]
    InvalidEnum { name: &'static str, value: u8 },
    #[error("unknown packet id {0}")]
    UnknownPacket(u8),
    #[error("packet id {0} is not accepted from this side")]
    UnexpectedPacket(u8),
    #[error("empty packet")]
    Empty,
}

/// A protocol enum stored as a single byte.
pub trait WireEnum: Sized + Copy {
    const NAME: &'static str;

    fn from_byte(value: u8) -> Option<Self>;

    fn to_byte(self) -> u8;
}

/// Declares a `#[repr(u8)]` enum together with its [`WireEnum`] impl.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $crate::codec::WireEnum for $name {
            const NAME: &'static str = stringify!($name);

            fn from_byte(value: u8) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn to_byte(self) -> u8 {
                self as u8
            }
        }
    };
}

/// Read cursor over a received packet.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::OutOfBounds {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.read_u32().map(f32::from_bits)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_ivec3(&mut self) -> Result<IVec3, CodecError> {
        Ok(IVec3::new(self.read_i32()?, self.read_i32()?, self.read_i32()?))
    }

    pub fn read_color(&mut self) -> Result<Color, CodecError> {
        let [b, g, r] = self.take_array::<3>()?;
        Ok(Color::new(r, g, b))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Consumes everything up to the end of the packet.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_enum<T: WireEnum>(&mut self) -> Result<T, CodecError> {
        let value = self.read_u8()?;
        T::from_byte(value).ok_or(CodecError::InvalidEnum {
            name: T::NAME,
            value,
        })
    }
}

/// Write cursor over a scratch buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() > self.remaining() {
            return Err(CodecError::OutOfBounds {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Advances over a reserved region, zero-filling it.
    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        if n > self.remaining() {
            return Err(CodecError::OutOfBounds {
                needed: n,
                remaining: self.remaining(),
            });
        }
        self.buf[self.pos..self.pos + n].fill(0);
        self.pos += n;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.put(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), CodecError> {
        self.write_u32(value.to_bits())
    }

    pub fn write_vec3(&mut self, v: Vec3) -> Result<(), CodecError> {
        self.write_f32(v.x)?;
        self.write_f32(v.y)?;
        self.write_f32(v.z)
    }

    pub fn write_ivec3(&mut self, v: IVec3) -> Result<(), CodecError> {
        self.write_i32(v.x)?;
        self.write_i32(v.y)?;
        self.write_i32(v.z)
    }

    pub fn write_color(&mut self, color: Color) -> Result<(), CodecError> {
        self.put(&[color.b, color.g, color.r])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.put(bytes)
    }

    pub fn write_enum<T: WireEnum>(&mut self, value: T) -> Result<(), CodecError> {
        self.write_u8(value.to_byte())
    }

    /// Bytes written so far.
    pub fn finish(self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        &buf[..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    wire_enum! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Sample {
            First = 0,
            Last = 255,
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 7];
        let mut w = Writer::new(&mut buf);
        w.write_u8(0xAB).unwrap();
        w.write_u16(0x1234).unwrap();
        w.write_u32(0xDEADBEEF).unwrap();
        assert_eq!(w.finish(), &[0xAB, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert!(r.is_empty());
    }

    #[test]
    fn test_float_bit_pattern_preserved() {
        let mut buf = [0u8; 4];
        let mut w = Writer::new(&mut buf);
        w.write_f32(-0.36).unwrap();
        assert_eq!(buf, (-0.36f32).to_bits().to_le_bytes());

        let nan = f32::from_bits(0x7FC0_0001);
        let mut w = Writer::new(&mut buf);
        w.write_f32(nan).unwrap();
        let back = Reader::new(&buf).read_f32().unwrap();
        assert_eq!(back.to_bits(), 0x7FC0_0001);
    }

    #[test]
    fn test_color_is_bgr_on_wire() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.write_color(Color::new(0x11, 0x22, 0x33)).unwrap();
        assert_eq!(buf, [0x33, 0x22, 0x11]);

        let color = Reader::new(&[0x01, 0x02, 0x03]).read_color().unwrap();
        assert_eq!(color, Color::new(0x03, 0x02, 0x01));
    }

    #[test]
    fn test_read_past_end_fails_without_advancing() {
        let buf = [1u8, 2, 3];
        let mut r = Reader::new(&buf);
        r.read_u8().unwrap();
        assert_eq!(
            r.read_u32(),
            Err(CodecError::OutOfBounds {
                needed: 4,
                remaining: 2
            })
        );
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_u16().unwrap(), 0x0302);
    }

    #[test]
    fn test_write_past_end_fails() {
        let mut buf = [0u8; 2];
        let mut w = Writer::new(&mut buf);
        assert!(w.write_u32(1).is_err());
        assert!(w.write_vec3(Vec3::ZERO).is_err());
        assert_eq!(w.position(), 0);
        assert!(w.skip(3).is_err());
        w.skip(2).unwrap();
        assert_eq!(w.remaining(), 0);
    }

    #[test]
    fn test_skip_zero_fills() {
        let mut buf = [0xFFu8; 4];
        let mut w = Writer::new(&mut buf);
        w.write_u8(7).unwrap();
        w.skip(3).unwrap();
        assert_eq!(buf, [7, 0, 0, 0]);
    }

    #[test]
    fn test_enum_from_byte() {
        let mut r = Reader::new(&[0, 255, 3]);
        assert_eq!(r.read_enum::<Sample>().unwrap(), Sample::First);
        assert_eq!(r.read_enum::<Sample>().unwrap(), Sample::Last);
        assert_eq!(
            r.read_enum::<Sample>(),
            Err(CodecError::InvalidEnum {
                name: "Sample",
                value: 3
            })
        );
    }

    #[test]
    fn test_vectors_and_rest() {
        let mut buf = [0u8; 26];
        let mut w = Writer::new(&mut buf);
        w.write_vec3(Vec3::new(1.0, -2.5, 63.0)).unwrap();
        w.write_ivec3(IVec3::new(-1, 511, 62)).unwrap();
        w.write_bytes(b"hi").unwrap();

        let mut r = Reader::new(&buf);
        assert_eq!(r.read_vec3().unwrap(), Vec3::new(1.0, -2.5, 63.0));
        assert_eq!(r.read_ivec3().unwrap(), IVec3::new(-1, 511, 62));
        assert_eq!(r.read_rest(), b"hi");
        assert!(r.is_empty());
    }
}
