//! kube-convergence reconciles external resources (cloud subscriptions,
//! queues, webhooks) against the desired state declared by the Kubernetes
//! objects owning them.
//!
//! A connector supplies three capabilities for its resource kind:
//! a [`Synthesizer`] building the canonical desired state from the owner,
//! a [`Facade`] reading and writing the external resource,
//! and a [`Comparator`] telling whether both states match.
//! The generic [`Actuator`] runs the control flow on top of them:
//! probe, compare, create or update, and report the outcome to the owner's
//! status through a [`StatusSink`].
//!
//! Retries are left to the controller invoking the actuator, which maps each
//! [`Outcome`] to a requeue decision with [`Outcome::action`].
//!
//! The [`eventgrid`] module is the reference connector for Azure Event Grid
//! subscriptions.

pub mod actuator;
pub mod classify;
pub mod compare;
pub mod config;
pub mod eventgrid;
pub mod facade;
pub mod kubernetes;
pub mod naming;
pub mod outcome;
pub mod skip;
pub mod status;
pub mod synthesize;

pub use actuator::Actuator;
pub use compare::Comparator;
pub use config::{on, Settings, Vocabulary};
pub use facade::{Facade, Observed};
pub use outcome::{Outcome, Permanence};
pub use status::StatusSink;
pub use synthesize::Synthesizer;

#[cfg(test)]
mod tests;
