//! Semantic comparison of desired and observed external state.

use std::marker::PhantomData;

use crate::facade::Observed;

/// Decides whether an observed resource already matches the desired state.
pub trait Comparator: Send + Sync {
    type Desired;
    type Observed;

    /// Compares only the attributes controlled by the
    /// [`Synthesizer`](crate::synthesize::Synthesizer), ignoring
    /// server-assigned ones such as identifiers or provisioning states.
    fn equal_present(&self, desired: &Self::Desired, observed: &Self::Observed) -> bool;

    /// An absent resource never matches.
    fn equal(&self, desired: &Self::Desired, observed: &Observed<Self::Observed>) -> bool {
        observed
            .as_present()
            .is_some_and(|observed| self.equal_present(desired, observed))
    }
}

/// Compares values of the same type with `==`.
///
/// Suitable when the facade returns exactly the representation it was given.
pub struct Exact<T>(PhantomData<fn() -> T>);

impl<T> Exact<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Exact<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> Comparator for Exact<T> {
    type Desired = T;
    type Observed = T;

    fn equal_present(&self, desired: &T, observed: &T) -> bool {
        desired == observed
    }
}
