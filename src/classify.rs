//! Mapping of backend errors to a small, stable taxonomy.
//!
//! Backends wrap their errors in arbitrary hierarchies. A [`Classifier`] walks
//! such a hierarchy with an ordered list of [`UnwrapRule`]s and produces a
//! [`Classification`]: one [`ErrorClass`] plus a flattened message that is
//! safe to write into a status condition (no correlation IDs, no timestamps).

use std::{error::Error, fmt, sync::OnceLock};

use regex::Regex;

/// Deepest nesting level walked before giving up on an error chain.
const MAX_DEPTH: usize = 32;

/// Separator between the messages of two nesting levels.
const SEPARATOR: &str = ": ";

/// Category of a failed call against an external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The resource does not exist. Expected during probing and deletion.
    NotFound,
    /// The credentials lack the required permissions.
    AccessDenied,
    /// The call timed out or was cancelled.
    Transient,
    /// Anything else.
    Unknown,
}

impl ErrorClass {
    /// Maps an HTTP status code reported by a backend.
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            404 => Some(Self::NotFound),
            401 | 403 => Some(Self::AccessDenied),
            _ => None,
        }
    }

    /// Whether retrying without human intervention is pointless.
    pub fn is_permanent(self) -> bool {
        matches!(self, Self::AccessDenied)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "NotFound",
            Self::AccessDenied => "AccessDenied",
            Self::Transient => "Transient",
            Self::Unknown => "Unknown",
        })
    }
}

/// The result of [`Classifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub class: ErrorClass,
    /// Flattened and sanitized description of the whole error chain.
    pub message: String,
}

/// What a rule extracted from one nesting level of an error.
#[derive(Default)]
pub struct Step<'a> {
    message: Option<String>,
    status: Option<u16>,
    transient: bool,
    /// Display output of a level no rule matched, which may embed its source.
    derived: bool,
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Step<'a> {
    /// A level contributing `message` to the flattened description.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attaches the HTTP status code reported at this level.
    pub fn status(mut self, code: impl Into<Option<u16>>) -> Self {
        self.status = code.into();
        self
    }

    /// Marks the error as a timeout or an interrupted connection.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Continues the walk with a nested error.
    pub fn then(mut self, next: Option<&'a (dyn Error + 'static)>) -> Self {
        self.next = next;
        self
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("message", &self.message)
            .field("status", &self.status)
            .field("transient", &self.transient)
            .field("derived", &self.derived)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}

/// One link of the unwrapping chain of responsibility.
pub trait UnwrapRule: Send + Sync {
    /// Whether this rule knows how to unwrap `err`.
    fn matches(&self, err: &(dyn Error + 'static)) -> bool;

    /// Extracts a [`Step`] from an error accepted by [`matches`](Self::matches).
    fn unwrap<'a>(&self, err: &'a (dyn Error + 'static)) -> Step<'a>;
}

struct Rule<P, X> {
    predicate: P,
    extractor: X,
}

impl<P, X> UnwrapRule for Rule<P, X>
where
    P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
    X: for<'a> Fn(&'a (dyn Error + 'static)) -> Step<'a> + Send + Sync,
{
    fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        (self.predicate)(err)
    }

    fn unwrap<'a>(&self, err: &'a (dyn Error + 'static)) -> Step<'a> {
        (self.extractor)(err)
    }
}

/// Builds a rule from a predicate and an extractor.
pub fn rule<P, X>(predicate: P, extractor: X) -> impl UnwrapRule
where
    P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
    X: for<'a> Fn(&'a (dyn Error + 'static)) -> Step<'a> + Send + Sync,
{
    Rule {
        predicate,
        extractor,
    }
}

/// Builds a rule matching every level whose concrete type is `E`.
pub fn typed<E, X>(extractor: X) -> impl UnwrapRule
where
    E: Error + 'static,
    X: for<'a> Fn(&'a E) -> Step<'a> + Send + Sync,
{
    rule(
        |err: &(dyn Error + 'static)| err.is::<E>(),
        move |err| match err.downcast_ref::<E>() {
            Some(err) => extractor(err),
            None => fallback(err),
        },
    )
}

fn fallback<'a>(err: &'a (dyn Error + 'static)) -> Step<'a> {
    Step {
        derived: true,
        ..Step::message(err.to_string()).then(err.source())
    }
}

/// Walks error chains with registered [`UnwrapRule`]s.
///
/// Levels no rule matches contribute their `Display` output and continue with
/// [`Error::source`]. Such output is dropped when the level above already
/// quotes it, as `thiserror` wrappers do.
#[derive(Default)]
pub struct Classifier {
    rules: Vec<Box<dyn UnwrapRule>>,
    scrubbers: Vec<Regex>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Rules are consulted in registration order.
    pub fn with_rule(mut self, rule: impl UnwrapRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Removes every match of `pattern` from classified messages, on top of
    /// the built-in scrubbing of IDs and timestamps.
    pub fn scrub(mut self, pattern: Regex) -> Self {
        self.scrubbers.push(pattern);
        self
    }

    pub fn classify(&self, err: &(dyn Error + 'static)) -> Classification {
        let mut fragments: Vec<String> = Vec::new();
        let mut status = None;
        let mut transient = false;

        let mut current = Some(err);
        let mut depth = 0;
        while let Some(level) = current {
            if depth == MAX_DEPTH {
                break;
            }
            depth += 1;

            let step = self.step(level);
            status = status.or(step.status);
            transient |= step.transient;

            if let Some(message) = step.message {
                let message = message.trim();
                let repeated =
                    step.derived && fragments.last().is_some_and(|prev| prev.contains(message));
                if !message.is_empty() && !repeated {
                    fragments.push(message.to_owned());
                }
            }
            current = step.next;
        }

        let class = match status.and_then(ErrorClass::from_status) {
            Some(class) => class,
            None if transient => ErrorClass::Transient,
            None => ErrorClass::Unknown,
        };

        Classification {
            class,
            message: self.sanitize(&fragments.join(SEPARATOR)),
        }
    }

    fn step<'a>(&self, err: &'a (dyn Error + 'static)) -> Step<'a> {
        self.rules
            .iter()
            .find(|rule| rule.matches(err))
            .map_or_else(|| fallback(err), |rule| rule.unwrap(err))
    }

    /// Strips non-deterministic substrings from a message.
    pub fn sanitize(&self, message: &str) -> String {
        let mut out = message.to_owned();
        for pattern in self.scrubbers.iter().chain(builtin_scrubbers()) {
            out = pattern.replace_all(&out, "").into_owned();
        }
        tidy(&out)
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("rules", &self.rules.len())
            .field("scrubbers", &self.scrubbers)
            .finish()
    }
}

const BUILTIN_PATTERNS: &[&str] = &[
    // labelled identifiers, e.g. "Correlation ID: 3f2a..." or "RequestId=abc"
    r"(?i)\b(?:x-ms-)?(?:correlation|request|tracking|trace|activity|client-request)[ _-]?id\s*[:=]\s*[\w-]+",
    // RFC 3339 timestamps
    r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
    // empty brackets left behind
    r"\(\s*\)|\[\s*\]",
];

fn builtin_scrubbers() -> &'static [Regex] {
    static SCRUBBERS: OnceLock<Vec<Regex>> = OnceLock::new();
    SCRUBBERS.get_or_init(|| {
        BUILTIN_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn tidy(message: &str) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    static DANGLING: OnceLock<Option<Regex>> = OnceLock::new();

    let mut out = message.to_owned();
    if let Some(ws) = WHITESPACE.get_or_init(|| Regex::new(r"\s{2,}").ok()) {
        out = ws.replace_all(&out, " ").into_owned();
    }
    if let Some(dangling) = DANGLING.get_or_init(|| Regex::new(r"\s+([,.;:])").ok()) {
        out = dangling.replace_all(&out, "$1").into_owned();
    }
    out.trim()
        .trim_end_matches([',', ';', ':'])
        .trim_end()
        .to_owned()
}
