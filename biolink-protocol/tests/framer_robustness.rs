//! Property tests for framing robustness
//!
//! The receiver must survive arbitrary garbage on the wire: no panic, no
//! spurious frame, and a valid frame following the garbage still decodes.

use proptest::prelude::*;

use biolink_protocol::{Frame, LineFramer};

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..20)
    ) {
        let mut framer = LineFramer::new();
        for chunk in &chunks {
            framer.push(chunk, |line| {
                // Decoding may fail, but must never panic.
                let _ = Frame::decode(line);
            });
        }
    }

    #[test]
    fn valid_frame_decodes_after_noise(noise in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut framer = LineFramer::new();
        framer.push(&noise, |_| {});
        // Terminate whatever the noise left buffered, then send one good frame.
        framer.push(b"\n", |_| {});

        let mut decoded = Vec::new();
        framer.push(b"EVT kind=boot\n", |line| {
            decoded.push(Frame::decode(line).expect("clean frame must decode"));
        });
        prop_assert_eq!(decoded.len(), 1);
    }
}
