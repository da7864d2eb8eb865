use num_traits::{FromPrimitive, ToPrimitive};
use core::ops::{Add, Div, Mul, Sub};

pub mod linear_map;
pub mod range;

// we define numbers as ring including the additive and multiplicative inverses
// comutation on multiplication is implied (monoid). This means matrices are not
// allowed, which is enforced by FromPrimitive and ToPrimitive. Integer types
// qualify too, so everything in here multiplies before it divides.
pub trait Number: Copy + PartialOrd + Sub<Output = Self> + Add<Output = Self> +
    Div<Output = Self> + Mul<Output = Self> + FromPrimitive + ToPrimitive {}

impl<T> Number for T where T: Copy + PartialOrd + Sub<Output = T> + Add<Output = T> + Div<Output = T> + Mul<Output = T> + FromPrimitive + ToPrimitive {}
