/// Distinguishes a cold boot from the console's reset button.
///
/// A soft reset reruns the CPU's reset micro-sequence with registers and RAM
/// intact; power-on restores every component to its known initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    PowerOn,
    Soft,
}
