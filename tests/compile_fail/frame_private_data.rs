// Rationale: frame bytes are read through accessors; the buffer itself is private.
use skillhost::PendingFrame;

fn main() {
    let frame = PendingFrame::from_bgra8(vec![0u8; 4], 1, 1).unwrap();
    let _bytes = frame.data;
}
