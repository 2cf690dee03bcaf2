//! Administrator password generation.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::{SecretError, SecretResult};
use super::no_log::SensitiveString;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Character classes a default password must mix, out of lowercase,
/// uppercase, digits and symbols.
pub const DEFAULT_MIN_CHARACTER_CLASSES: usize = 3;

/// ASCII letters, digits and punctuation.
pub const DEFAULT_ALPHABET: &str = concat!(
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "abcdefghijklmnopqrstuvwxyz",
    "0123456789",
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~",
);

/// Length and alphabet for generated passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Number of characters to generate
    pub length: usize,
    /// Characters to draw from
    pub alphabet: String,
    /// Distinct character classes each password must contain. Capped by
    /// what the alphabet and length can provide; 0 disables the check.
    pub min_character_classes: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            alphabet: DEFAULT_ALPHABET.to_string(),
            min_character_classes: DEFAULT_MIN_CHARACTER_CLASSES,
        }
    }
}

impl PasswordPolicy {
    /// Check that the policy can produce a password.
    pub fn validate(&self) -> SecretResult<()> {
        if self.length == 0 {
            return Err(SecretError::Configuration(
                "password length must be at least 1".into(),
            ));
        }
        if self.alphabet.is_empty() {
            return Err(SecretError::Configuration(
                "password alphabet must not be empty".into(),
            ));
        }
        if self.min_character_classes > CHARACTER_CLASSES {
            return Err(SecretError::Configuration(format!(
                "password min_character_classes must be at most {}",
                CHARACTER_CLASSES
            )));
        }
        Ok(())
    }
}

const CHARACTER_CLASSES: usize = 4;

fn class_of(c: char) -> usize {
    if c.is_ascii_lowercase() {
        0
    } else if c.is_ascii_uppercase() {
        1
    } else if c.is_ascii_digit() {
        2
    } else {
        3
    }
}

/// Number of classes (lowercase, uppercase, digit, other) present in `text`.
pub fn character_classes(text: &str) -> usize {
    let mut seen = [false; CHARACTER_CLASSES];
    for c in text.chars() {
        seen[class_of(c)] = true;
    }
    seen.iter().filter(|present| **present).count()
}

/// Generates passwords from the operating system CSPRNG.
///
/// Each character is drawn independently and uniformly from the policy's
/// alphabet. Repeated characters in the configured alphabet are collapsed
/// so they do not skew the distribution. Draws that mix too few character
/// classes are discarded and redrawn, so the result is uniform over the
/// passwords that satisfy the policy.
#[derive(Debug, Clone)]
pub struct PasswordGenerator {
    length: usize,
    alphabet: Vec<char>,
    required_classes: usize,
}

impl PasswordGenerator {
    /// Create a generator, rejecting empty alphabets and zero lengths.
    pub fn new(policy: &PasswordPolicy) -> SecretResult<Self> {
        policy.validate()?;

        let mut alphabet: Vec<char> = Vec::with_capacity(policy.alphabet.len());
        for c in policy.alphabet.chars() {
            if !alphabet.contains(&c) {
                alphabet.push(c);
            }
        }

        let available: String = alphabet.iter().collect();
        let required_classes = policy
            .min_character_classes
            .min(character_classes(&available))
            .min(policy.length);

        Ok(Self {
            length: policy.length,
            alphabet,
            required_classes,
        })
    }

    /// Number of characters each password will have.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The distinct characters passwords are drawn from.
    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Character classes every generated password contains.
    pub fn required_classes(&self) -> usize {
        self.required_classes
    }

    /// Mint a new password.
    pub fn generate(&self) -> SensitiveString {
        let mut rng = OsRng;
        loop {
            let candidate: String = (0..self.length)
                .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
                .collect();
            if character_classes(&candidate) >= self.required_classes {
                return SensitiveString::new(candidate);
            }
        }
    }
}

impl Default for PasswordGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            required_classes: DEFAULT_MIN_CHARACTER_CLASSES,
        }
    }
}
