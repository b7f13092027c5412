#![no_main]

use game_netcore::core::bits::{BitRead, BitReader};
use game_netcore::transport::remote::decode_packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Inbound packets come straight off the wire; decoding must never panic.
    if let Ok(frames) = decode_packet(data) {
        for (_, payload) in frames {
            let mut reader = BitReader::new(payload);
            let _ = reader.read_bool();
            let _ = reader.read_packed_u64();
            let _ = reader.read_string();
        }
    }

    let mut reader = BitReader::new(data);
    while reader.read_bool().is_ok() && reader.read_packed_u32().is_ok() {}
});
