// Rationale: the underlying guard stays private so a permit cannot be split
// from the context it admits into.
use skillhost::AdmissionGate;

fn main() {
    let gate = AdmissionGate::new(0u32);
    let permit = gate.try_admit().unwrap();
    let _guard = permit.guard;
}
