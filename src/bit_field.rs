use std::mem::size_of;
use std::ops::RangeInclusive;

/// A hardware register viewed as individually addressable bits. The generic parameter should be
/// an unsigned integer type. Bit 0 is the least significant bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField<T> {
    value: T,
}

impl<T> BitField<T>
where
    T: num::PrimInt + std::ops::BitOrAssign + std::ops::BitAndAssign,
{
    pub fn new() -> Self {
        Self { value: T::zero() }
    }

    pub fn size(&self) -> usize {
        size_of::<T>() * 8
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.size());
        (self.value >> index) & T::one() == T::one()
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.size());
        if value {
            self.value |= T::one() << index;
        } else {
            self.value &= !(T::one() << index);
        }
    }

    fn range_mask(width: usize) -> T {
        if width >= size_of::<T>() * 8 {
            T::max_value()
        } else {
            (T::one() << width) - T::one()
        }
    }

    pub fn get_range_value(&self, indices: RangeInclusive<usize>) -> T {
        let (low, high) = indices.into_inner();
        (self.value >> low) & Self::range_mask(high - low + 1)
    }

    /// Replaces the bits in `indices` with the low bits of `value`.
    pub fn set_range_value(&mut self, indices: RangeInclusive<usize>, value: T) {
        let (low, high) = indices.into_inner();
        let mask = Self::range_mask(high - low + 1);
        self.value &= !(mask << low);
        self.value |= (value & mask) << low;
    }

    pub fn as_value(&self) -> T {
        self.value
    }
}

impl<T> Default for BitField<T>
where
    T: num::PrimInt + std::ops::BitOrAssign + std::ops::BitAndAssign,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<T> for BitField<T>
where
    T: num::PrimInt + std::ops::BitOrAssign + std::ops::BitAndAssign,
{
    fn from(value: T) -> Self {
        Self { value }
    }
}
