//! Change detection over the provider's free-text descriptions.
//!
//! The provider reports whether a registration changed anything only in the
//! human readable `description` field. [`ChangeClassifier`] matches it
//! against two configurable phrase lists and returns a tagged
//! [`ChangeSignal`], so a wording change at the provider is a configuration
//! update.
//!
//! # Example
//!
//! ```rust
//! use hook_sync::clients::{ChangeClassifier, ChangeSignal, RegistrationResult};
//!
//! let classifier = ChangeClassifier::default();
//!
//! let result = RegistrationResult::success("Webhook was set");
//! assert!(classifier.classify_change(&result));
//!
//! let result = RegistrationResult::success("Webhook is already set");
//! assert!(matches!(
//!     classifier.classify(&result),
//!     ChangeSignal::AlreadyApplied { .. }
//! ));
//! ```

use super::types::RegistrationResult;

/// Phrases reporting that the registration was already in place.
pub const DEFAULT_UNCHANGED_PHRASES: [&str; 2] = ["already set", "already deleted"];

/// Phrases reporting that the registration was applied by this call.
pub const DEFAULT_CHANGED_PHRASES: [&str; 2] = ["was set", "was deleted"];

/// What a registration result says about provider-side state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeSignal {
    /// The provider already had the requested registration.
    AlreadyApplied {
        /// The phrase that matched.
        phrase: String,
    },
    /// The call changed the provider-side registration.
    Applied {
        /// The phrase that matched.
        phrase: String,
    },
    /// The description matched no known phrase.
    Unrecognized,
    /// The call failed (`ok: false`).
    Failed,
}

impl ChangeSignal {
    /// Returns `true` only for [`ChangeSignal::Applied`].
    ///
    /// Unrecognized descriptions count as no change.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Matches provider descriptions against known phrases.
///
/// Matching is a case-insensitive substring test. The unchanged list is
/// checked first, so "already set" never reads as "was set".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeClassifier {
    unchanged: Vec<String>,
    changed: Vec<String>,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_UNCHANGED_PHRASES, DEFAULT_CHANGED_PHRASES)
    }
}

impl ChangeClassifier {
    /// Creates a classifier from the two phrase lists.
    #[must_use]
    pub fn new<U, C>(unchanged: U, changed: C) -> Self
    where
        U: IntoIterator,
        U::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let normalize = |phrase: &str| phrase.trim().to_lowercase();
        Self {
            unchanged: unchanged
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
            changed: changed
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Phrases meaning "no change".
    #[must_use]
    pub fn unchanged_phrases(&self) -> &[String] {
        &self.unchanged
    }

    /// Phrases meaning "changed".
    #[must_use]
    pub fn changed_phrases(&self) -> &[String] {
        &self.changed
    }

    /// Classifies a registration result.
    #[must_use]
    pub fn classify(&self, result: &RegistrationResult) -> ChangeSignal {
        if !result.ok {
            return ChangeSignal::Failed;
        }

        let description = result.description.to_lowercase();
        if let Some(phrase) = find_phrase(&self.unchanged, &description) {
            return ChangeSignal::AlreadyApplied { phrase };
        }
        if let Some(phrase) = find_phrase(&self.changed, &description) {
            return ChangeSignal::Applied { phrase };
        }

        tracing::debug!(
            description = %result.description,
            "Unrecognized provider description, treating as no change"
        );
        ChangeSignal::Unrecognized
    }

    /// Returns `true` if the result reports a provider-side change.
    #[must_use]
    pub fn classify_change(&self, result: &RegistrationResult) -> bool {
        self.classify(result).is_change()
    }
}

fn find_phrase(phrases: &[String], description: &str) -> Option<String> {
    phrases
        .iter()
        .find(|phrase| description.contains(phrase.as_str()))
        .cloned()
}
