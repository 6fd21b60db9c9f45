/// True exactly on a false → true transition.
pub fn onset(previous: bool, current: bool) -> bool {
    current && !previous
}

/// Remembers the last `has_any` value and reports onset edges.
#[derive(Debug, Default)]
pub struct OnsetDetector {
    previous: bool,
}

impl OnsetDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current alert flag; returns true on onset only.
    pub fn observe(&mut self, current: bool) -> bool {
        let fired = onset(self.previous, current);
        self.previous = current;
        fired
    }
}
