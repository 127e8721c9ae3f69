// Licensed under the Apache-2.0 license

pub mod activate_fw;
pub mod apply_complete;
pub mod cancel_update;
pub mod get_status;
pub mod pass_component;
pub mod request_fw_data;
pub mod request_update;
pub mod transfer_complete;
pub mod update_component;
pub mod verify_complete;

use crate::codec::{PldmCodec, PldmCodecError};

/// Encodes a message whose fixed part is followed by a version string.
pub(crate) fn encode_with_version<T: PldmCodec>(
    fixed: &T,
    version: &[u8],
    buffer: &mut [u8],
) -> Result<usize, PldmCodecError> {
    let fixed_len = fixed.encode(buffer)?;
    let bytes = fixed_len + version.len();
    if buffer.len() < bytes {
        return Err(PldmCodecError::BufferTooShort);
    }
    buffer[fixed_len..bytes].copy_from_slice(version);
    Ok(bytes)
}

/// The version string trailing a fixed part of `fixed_len` bytes, or `None`
/// when the message length does not match the advertised string length.
pub(crate) fn trailing_version(buffer: &[u8], fixed_len: usize, ver_str_len: u8) -> Option<&[u8]> {
    if buffer.len() != fixed_len + ver_str_len as usize {
        return None;
    }
    Some(&buffer[fixed_len..])
}
