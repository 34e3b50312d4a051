//! Suppression of reconcile and finalize passes.

/// Consulted at the top of every pass. A skipped pass touches neither the
/// external API nor the status of the owner.
pub trait SkipGate<Owner: ?Sized>: Send + Sync {
    fn should_skip(&self, owner: &Owner) -> bool;
}

/// Never skips.
#[derive(Debug, Default, Clone, Copy)]
pub struct Never;

impl<Owner: ?Sized> SkipGate<Owner> for Never {
    fn should_skip(&self, _owner: &Owner) -> bool {
        false
    }
}

impl<Owner, F> SkipGate<Owner> for F
where
    Owner: ?Sized,
    F: Fn(&Owner) -> bool + Send + Sync,
{
    fn should_skip(&self, owner: &Owner) -> bool {
        self(owner)
    }
}
