use std::fmt;

/// Bounds the renderer's scroll binding is installed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRange {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorMode {
    /// One slice only; scrolling is not bound.
    SingleImage,
    MultiImage { count: usize },
}

impl fmt::Display for NavigatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigatorMode::SingleImage => write!(f, "Loaded single image"),
            NavigatorMode::MultiImage { count } => {
                write!(f, "Loaded {count} images, scroll to navigate")
            }
        }
    }
}

/// `clamp(current + delta * step, 0, max)`
#[inline]
pub fn transition(current: usize, delta: i64, step: usize, max: usize) -> usize {
    let offset = delta.saturating_mul(step as i64);
    (current as i64)
        .saturating_add(offset)
        .clamp(0, max as i64) as usize
}

/// Discrete slice position over a stack of `max + 1` slices.
///
/// Every mutating call returns the new index when it changed and `None`
/// otherwise; callers re-window and redraw only on `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceNavigator {
    current: usize,
    max: usize,
    step: usize,
    // Fractional wheel movement not yet turned into a slice step.
    pending: f64,
}

impl SliceNavigator {
    /// `None` for an empty stack. A `step` of zero is treated as one.
    pub fn new(stack_len: usize, step: usize) -> Option<Self> {
        let max = stack_len.checked_sub(1)?;
        Some(Self {
            current: 0,
            max,
            step: step.max(1),
            pending: 0.0,
        })
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn min_index(&self) -> usize {
        0
    }

    pub fn max_index(&self) -> usize {
        self.max
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn mode(&self) -> NavigatorMode {
        if self.max == 0 {
            NavigatorMode::SingleImage
        } else {
            NavigatorMode::MultiImage {
                count: self.max + 1,
            }
        }
    }

    /// Range to bind scrolling to, or `None` when there is nothing to scroll.
    pub fn scroll_range(&self) -> Option<ScrollRange> {
        match self.mode() {
            NavigatorMode::SingleImage => None,
            NavigatorMode::MultiImage { .. } => Some(ScrollRange {
                min: self.min_index(),
                max: self.max,
                step: self.step,
            }),
        }
    }

    pub fn scroll(&mut self, delta: i64) -> Option<usize> {
        self.move_to(transition(self.current, delta, self.step, self.max))
    }

    pub fn set_index(&mut self, index: usize) -> Option<usize> {
        self.pending = 0.0;
        self.move_to(index.min(self.max))
    }

    /// Accumulate a fractional scroll delta and step by the whole part.
    ///
    /// The fraction carries over to the next call unless the direction
    /// reverses.
    pub fn scroll_continuous(&mut self, delta: f64) -> Option<usize> {
        if !delta.is_finite() {
            return None;
        }
        if self.pending * delta < 0.0 {
            self.pending = 0.0;
        }
        self.pending += delta;
        let whole = self.pending.trunc();
        self.pending -= whole;
        if whole == 0.0 {
            return None;
        }
        self.scroll(whole as i64)
    }

    fn move_to(&mut self, index: usize) -> Option<usize> {
        if index == self.current {
            return None;
        }
        self.current = index;
        Some(index)
    }
}
