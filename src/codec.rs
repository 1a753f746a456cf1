//! Encode and decode drivers for message values.
//!
//! Both drivers walk the message descriptor: the encoder visits declared
//! fields in ascending tag order, the decoder dispatches on decoded field
//! keys. All wire-level work is delegated to [`crate::leb128`] and
//! [`crate::wire`].

mod decode;
mod encode;

pub(crate) use decode::{check_required, decode_into};
pub(crate) use encode::{encode_message, encoded_message_len};
