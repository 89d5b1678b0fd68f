#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::options::TransportMode;
use tether_wire::codec::{Decoded, Decoder};

const MAX_FRAME: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // first byte picks the read size, the rest is the wire
    let chunk = usize::from(data[0]).max(1);
    let wire = &data[1..];

    for mode in [TransportMode::Framed, TransportMode::Raw] {
        let mut decoder = Decoder::new(mode, Some(MAX_FRAME));
        let mut out = vec![0u8; 512];
        let mut filled = 0;

        'feed: for piece in wire.chunks(chunk) {
            decoder.feed(piece);
            loop {
                match decoder.decode_into(&mut out[filled..]) {
                    Ok(Some(Decoded::Chunk { count, end_of_message, .. })) => {
                        filled += count;
                        assert!(filled <= out.len());
                        if end_of_message {
                            filled = 0;
                        } else if filled == out.len() {
                            out.resize(out.len() * 2, 0);
                        }
                    }
                    Ok(Some(Decoded::Close)) => filled = 0,
                    Ok(None) => break,
                    Err(_) => break 'feed,
                }
                if out.len() > 4 * MAX_FRAME {
                    break 'feed;
                }
            }
        }
    }
});
