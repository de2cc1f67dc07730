// Rationale: the guarded context has no path around the admission gate.
use skillhost::AdmissionGate;

fn main() {
    let gate = AdmissionGate::new(5u32);
    let _slot = gate.slot;
}
