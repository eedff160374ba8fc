pub mod decoder;
mod error;
pub mod hidden;
pub mod meta;
pub mod packet;
pub mod replay_file;
pub mod stats;
#[doc(hidden)]
pub mod testkit;
pub mod types;
pub mod version;

pub use decoder::{DecodedReplay, ReplayDecoder};
pub use error::*;
pub use replay_file::ReplayFile;

pub type IResult<'a, T> = nom::IResult<&'a [u8], T>;
