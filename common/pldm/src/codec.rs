// Licensed under the Apache-2.0 license

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PldmCodecError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("unsupported encoding")]
    Unsupported,
}

/// A trait for encoding and decoding PLDM (Platform Level Data Model) messages.
///
/// This trait provides methods for encoding a PLDM message into a byte buffer
/// and decoding a PLDM message from a byte buffer. Implementers of this trait
/// must also implement the `Debug` trait and be `Sized`.
pub trait PldmCodec: core::fmt::Debug + Sized {
    /// Encodes the PLDM message into the provided byte buffer.
    ///
    /// Returns the size of the encoded message on success.
    fn encode(&self, buffer: &mut [u8]) -> Result<usize, PldmCodecError>;

    /// Decodes a PLDM message from the provided byte buffer.
    fn decode(buffer: &[u8]) -> Result<Self, PldmCodecError>;
}

/// Implements `PldmCodec` for fixed-size zerocopy message structs.
macro_rules! impl_fixed_size_codec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::codec::PldmCodec for $ty {
                fn encode(
                    &self,
                    buffer: &mut [u8],
                ) -> Result<usize, $crate::codec::PldmCodecError> {
                    let bytes = core::mem::size_of::<$ty>();
                    if buffer.len() < bytes {
                        return Err($crate::codec::PldmCodecError::BufferTooShort);
                    }
                    zerocopy::IntoBytes::write_to(self, &mut buffer[..bytes])
                        .map_err(|_| $crate::codec::PldmCodecError::BufferTooShort)?;
                    Ok(bytes)
                }

                fn decode(buffer: &[u8]) -> Result<Self, $crate::codec::PldmCodecError> {
                    let bytes = core::mem::size_of::<$ty>();
                    if buffer.len() < bytes {
                        return Err($crate::codec::PldmCodecError::BufferTooShort);
                    }
                    <$ty as zerocopy::FromBytes>::read_from_bytes(&buffer[..bytes])
                        .map_err(|_| $crate::codec::PldmCodecError::BufferTooShort)
                }
            }
        )+
    };
}

pub(crate) use impl_fixed_size_codec;

