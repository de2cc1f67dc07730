// Rationale: pending frames are transient capture buffers and must never be serialized.
use serde::Serialize;
use skillhost::PendingFrame;

#[derive(Serialize)]
struct Wrapper {
    frame: PendingFrame,
}

fn main() {}
