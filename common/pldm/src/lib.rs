// Licensed under the Apache-2.0 license

pub mod codec;
pub mod error;
pub mod message;
pub mod protocol;
