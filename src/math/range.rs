use super::Number;

// closed interval used as one side of a linear mapping
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range<T>
where
    T: Number
{
    min: T,
    max: T,
}

impl<T> Range<T>
where
    T: Number
{
    pub const fn new(min: T, max: T) -> Self {
        Range { min, max }
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    pub fn span(&self) -> T {
        self.max - self.min
    }

    pub fn map_value_to_range(&self, val: T, new_range: &Range<T>) -> T {
        (val - self.min) * new_range.span() / self.span() + new_range.min
    }

    // differences only scale, the offsets cancel
    pub fn map_delta_to_range(&self, delta: T, new_range: &Range<T>) -> T {
        delta * new_range.span() / self.span()
    }
}
