//! Fixed-size decoding of values read from the target process

/// A value with a fixed little-endian layout in the target process.
///
/// Implemented for scalars and for every fixed-layout struct the crate reads
/// (positions, entity records, queue nodes, fade records).
pub trait RemoteValue: Copy + Default + PartialEq {
    /// Number of bytes occupied in the target process
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_remote_scalar {
    ($($ty:ty),*) => {
        $(
            impl RemoteValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_remote_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl RemoteValue for bool {
    const SIZE: usize = 1;

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Sequential little-endian cursor over a byte slice.
///
/// Struct decoders walk their fields in declaration order with it.
/// Reading past the end yields zero instead of panicking.
pub struct LeBytes<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeBytes<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut raw = [0u8; N];
        if let Some(slice) = self.bytes.get(self.pos..self.pos + N) {
            raw.copy_from_slice(slice);
        }
        self.pos += N;
        raw
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_decode() {
        assert_eq!(i32::decode(&(-5i32).to_le_bytes()), -5);
        assert_eq!(f32::decode(&1.5f32.to_le_bytes()), 1.5);
        assert!(bool::decode(&[2]));
        assert!(!bool::decode(&[0]));
    }

    #[test]
    fn test_cursor_reads_in_order() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());
        bytes.push(0xAB);

        let mut cursor = LeBytes::new(&bytes);
        assert_eq!(cursor.u32(), 7);
        assert_eq!(cursor.f32(), 2.0);
        assert_eq!(cursor.u8(), 0xAB);
        // Past the end
        assert_eq!(cursor.i32(), 0);
    }
}
