pub use vlheap_codec::*;
pub use {
    vlheap_codec as codec, vlheap_error as error, vlheap_io as io, vlheap_nd as nd,
};
