// Rationale: winning admission is the only way to hold a permit.
use skillhost::Permit;

fn main() {
    let _permit: Permit<u32> = Permit::new(todo!());
}
