#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mysqlx_protocol::frame::decode_frame;

fuzz_target!(|data: &[u8]| {
    // A small limit exercises the oversize path as well.
    let mut src = BytesMut::from(data);
    while let Ok(Some(_)) = decode_frame(&mut src, 4096) {}
});
