use typed_index_collections::TiVec;

/// Declares a newtype wrapping a `usize`, suitable as a [`TiVec`] key.
///
/// Generated types are dense, `Copy` and convert to/from `usize`.
#[macro_export]
macro_rules! idx_type {
    ($visibility:vis $name:ident) => {
        #[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        $visibility struct $name($visibility usize);

        impl From<usize> for $name {
            #[inline]
            fn from(idx: usize) -> Self {
                Self(idx)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(idx: $name) -> Self {
                idx.0
            }
        }
    };
}

/// Extra operations on [`TiVec`] that grow the backing storage instead of panicking.
pub trait TiVecSafeOperations<K, V>
where
    usize: From<K>,
    K: From<usize> + Copy,
    V: Default,
{
    /// Returns a mutable reference to the value at `idx`, growing the vector with
    /// `V::default()` entries if `idx` is out of bounds.
    fn get_mut_or_create(&mut self, idx: K) -> &mut V;
}

impl<K, V> TiVecSafeOperations<K, V> for TiVec<K, V>
where
    usize: From<K>,
    K: From<usize> + Copy,
    V: Default,
{
    fn get_mut_or_create(&mut self, idx: K) -> &mut V {
        (self.len()..=idx.into()).for_each(|_| self.push(V::default()));
        &mut self[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    idx_type!(pub(crate) TestIdx);

    #[test]
    fn convert_idx_to_and_from_usize() {
        let idx = TestIdx::from(4);
        assert_eq!(usize::from(idx), 4);
    }

    #[test]
    fn grow_ti_vec_when_index_is_out_of_bounds() {
        let mut vec: TiVec<TestIdx, u32> = TiVec::new();
        *vec.get_mut_or_create(TestIdx::from(3)) = 42;
        assert_eq!(vec.len(), 4);
        assert_eq!(vec[TestIdx::from(3)], 42);
        assert_eq!(vec[TestIdx::from(0)], 0);
    }
}
