//! Construction of the canonical desired state of an external resource.

/// Builds the desired representation of an external resource from its owner.
///
/// The output must set every attribute the remote API would otherwise default
/// on creation, so that comparing it with the observed state does not depend
/// on server-side defaulting.
pub trait Synthesizer: Send + Sync {
    /// The owning object.
    type Owner;
    /// The resolved delivery target, e.g. the ID of an Event Hub.
    type Target: ?Sized;
    type Desired;

    fn desired(&self, owner: &Self::Owner, target: &Self::Target) -> Self::Desired;
}

impl<S: Synthesizer> Synthesizer for &S {
    type Owner = S::Owner;
    type Target = S::Target;
    type Desired = S::Desired;

    fn desired(&self, owner: &Self::Owner, target: &Self::Target) -> Self::Desired {
        (**self).desired(owner, target)
    }
}
