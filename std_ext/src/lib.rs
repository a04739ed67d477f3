use std::sync::Arc;

use easy_ext::ext;

#[ext(ArcExt)]
pub impl<T: ?Sized> Arc<T> {
    #[must_use]
    fn clone_arc(&self) -> Self {
        Self::clone(self)
    }

    fn make_mut(&mut self) -> &mut T
    where
        T: Clone,
    {
        Self::make_mut(self)
    }
}

#[ext(CopyExt)]
pub impl<T: Copy> T {
    fn copy(&self) -> Self {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_mut_clones_shared_values() {
        let original = Arc::new(vec![1, 2, 3]);
        let mut copy = original.clone_arc();

        copy.make_mut().push(4);

        assert_eq!(*original, [1, 2, 3]);
        assert_eq!(*copy, [1, 2, 3, 4]);
    }

    #[test]
    fn make_mut_reuses_unique_values() {
        let mut unique = Arc::new(5);
        let pointer = Arc::as_ptr(&unique);

        *unique.make_mut() += 1;

        assert_eq!(*unique, 6);
        assert_eq!(Arc::as_ptr(&unique), pointer);
    }
}
