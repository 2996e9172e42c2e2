//! Event kind classification.
//!
//! Which kinds count as standard and which belong to the server's extension
//! space is an application decision, so the parser asks a [`KindClassifier`]
//! instead of hard-coding ranges.

use std::ops::RangeInclusive;

/// Standard NIP-01 kind space.
pub const STANDARD_KINDS: RangeInclusive<u64> = 0..=65_535;

/// Kinds reserved for server-defined extension payloads.
pub const EXTENSION_KINDS: RangeInclusive<u64> = 10_000_000..=19_999_999;

/// Where an event payload of a given kind belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClass {
    /// Signed user event, parsed as [`crate::Event`]
    Standard,
    /// Server-defined payload, parsed as [`crate::ExtensionEvent`]
    Extension,
    /// Neither; the payload is not parsed
    Unknown,
}

/// Predicate deciding the [`KindClass`] of a numeric kind.
pub trait KindClassifier: Send + Sync {
    fn classify(&self, kind: u64) -> KindClass;
}

/// Classifier using [`STANDARD_KINDS`] and [`EXTENSION_KINDS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKindClassifier;

impl KindClassifier for DefaultKindClassifier {
    fn classify(&self, kind: u64) -> KindClass {
        if EXTENSION_KINDS.contains(&kind) {
            KindClass::Extension
        } else if STANDARD_KINDS.contains(&kind) {
            KindClass::Standard
        } else {
            KindClass::Unknown
        }
    }
}

impl<F> KindClassifier for F
where
    F: Fn(u64) -> KindClass + Send + Sync,
{
    fn classify(&self, kind: u64) -> KindClass {
        self(kind)
    }
}
