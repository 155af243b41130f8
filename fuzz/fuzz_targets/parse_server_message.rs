#![no_main]

use libfuzzer_sys::fuzz_target;
use mysqlx_protocol::{ClientMessage, ServerMessage};

fuzz_target!(|data: &[u8]| {
    let Some((&message_type, payload)) = data.split_first() else {
        return;
    };

    let mut cursor = payload;
    let _ = ServerMessage::decode(message_type, &mut cursor);

    let mut cursor = payload;
    let _ = ClientMessage::decode(message_type, &mut cursor);
});
