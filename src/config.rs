use std::time::Duration;

use crate::{
    actuator::Actuator,
    classify::Classifier,
    compare::Comparator,
    facade::Facade,
    skip::{Never, SkipGate},
    synthesize::Synthesizer,
};

/// Upper bound of every call to the external API.
pub const DEFAULT_CRUD_TIMEOUT: Duration = Duration::from_secs(15);

/// Delay before a retryable failure is reconciled again.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Words used in status messages and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    /// The managed resource, e.g. "event subscription".
    pub resource: &'static str,
    /// What the scope of the managed resource is, e.g. "Azure resource".
    pub scope: &'static str,
    /// Status message prefix of a failed create or update.
    pub converge_failure: &'static str,
    pub reason_subscribed: &'static str,
    pub reason_failed_subscribe: &'static str,
    pub reason_unsubscribed: &'static str,
    pub reason_failed_unsubscribe: &'static str,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            resource: "event subscription",
            scope: "Azure resource",
            converge_failure: "Cannot subscribe to events",
            reason_subscribed: "Subscribed",
            reason_failed_subscribe: "FailedSubscribe",
            reason_unsubscribed: "Unsubscribed",
            reason_failed_unsubscribe: "FailedUnsubscribe",
        }
    }
}

/// Tunables of an [`Actuator`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub timeout: Duration,
    pub retry_after: Duration,
    /// Interval at which successful passes are repeated, if any.
    pub resync: Option<Duration>,
    pub vocabulary: Vocabulary,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CRUD_TIMEOUT,
            retry_after: DEFAULT_RETRY_AFTER,
            resync: None,
            vocabulary: Vocabulary::default(),
        }
    }
}

/// Assembles an [`Actuator`]. Created by [`on`].
pub struct Builder<F, S, C, G> {
    facade: F,
    synthesizer: S,
    comparator: C,
    gate: G,
    classifier: Classifier,
    settings: Settings,
}

/// Starts configuring an actuator converging resources through `facade`.
pub fn on<F: Facade>(facade: F) -> Builder<F, (), (), Never> {
    Builder {
        facade,
        synthesizer: (),
        comparator: (),
        gate: Never,
        classifier: Classifier::new(),
        settings: Settings::default(),
    }
}

impl<F, S, C, G> Builder<F, S, C, G> {
    /// Sets how desired states are built.
    pub fn synthesize<S2>(self, synthesizer: S2) -> Builder<F, S2, C, G> {
        Builder {
            facade: self.facade,
            synthesizer,
            comparator: self.comparator,
            gate: self.gate,
            classifier: self.classifier,
            settings: self.settings,
        }
    }

    /// Sets how desired and observed states are compared.
    pub fn compare<C2>(self, comparator: C2) -> Builder<F, S, C2, G> {
        Builder {
            facade: self.facade,
            synthesizer: self.synthesizer,
            comparator,
            gate: self.gate,
            classifier: self.classifier,
            settings: self.settings,
        }
    }

    /// Skips every pass for which `gate` answers `true`.
    pub fn skip_if<G2>(self, gate: G2) -> Builder<F, S, C, G2> {
        Builder {
            facade: self.facade,
            synthesizer: self.synthesizer,
            comparator: self.comparator,
            gate,
            classifier: self.classifier,
            settings: self.settings,
        }
    }

    /// Replaces the classifier used on backend errors.
    pub fn classify_with(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn retry_after(mut self, retry_after: Duration) -> Self {
        self.settings.retry_after = retry_after;
        self
    }

    pub fn resync(mut self, every: Duration) -> Self {
        self.settings.resync = Some(every);
        self
    }

    pub fn describe(mut self, vocabulary: Vocabulary) -> Self {
        self.settings.vocabulary = vocabulary;
        self
    }
}

impl<F, S, C, G> Builder<F, S, C, G>
where
    F: Facade,
    S: Synthesizer<Desired = F::Desired>,
    C: Comparator<Desired = F::Desired, Observed = F::Observed>,
    G: SkipGate<S::Owner>,
{
    pub fn build(self) -> Actuator<F, S, C, G> {
        Actuator {
            facade: self.facade,
            synthesizer: self.synthesizer,
            comparator: self.comparator,
            gate: self.gate,
            classifier: self.classifier,
            settings: self.settings,
        }
    }
}
