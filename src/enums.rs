/// Slice shown right after a stack has been published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitialSlice {
    #[default]
    First,
    Middle,
    Last,
}

impl InitialSlice {
    pub fn index(&self, max_index: usize) -> usize {
        match self {
            InitialSlice::First => 0,
            InitialSlice::Middle => max_index / 2,
            InitialSlice::Last => max_index,
        }
    }
}
