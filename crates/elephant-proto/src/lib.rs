pub mod codec;
pub mod frame;

pub use codec::{decode, encode, CodecError, WireFormat};
pub use frame::{
    read_frame, read_request, write_frame, write_request, FrameError, RequestFrame, RequestOp,
    ResponseOp, MAX_FRAME_LEN,
};
