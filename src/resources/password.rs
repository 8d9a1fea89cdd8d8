use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

const DIGITS: &[u8] = b"0123456789";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to read entropy from the operating system: {0}")]
    Entropy(String),

    #[error("invalid password policy: {0}")]
    Policy(String),
}

/// Shape of generated passwords
///
/// Characters never repeat within one password, so the policy is bounded by
/// the size of the digit and letter alphabets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: usize,
    pub digits: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 32,
            digits: 10,
        }
    }
}

impl PasswordPolicy {
    fn validate(self) -> Result<(), PasswordError> {
        if self.digits > self.length {
            return Err(PasswordError::Policy(format!(
                "{} digits do not fit in {} characters",
                self.digits, self.length
            )));
        }
        if self.digits > DIGITS.len() {
            return Err(PasswordError::Policy(format!(
                "at most {} distinct digits are available",
                DIGITS.len()
            )));
        }
        if self.length - self.digits > LETTERS.len() {
            return Err(PasswordError::Policy(format!(
                "at most {} distinct letters are available",
                LETTERS.len()
            )));
        }
        Ok(())
    }
}

/// Generate a 32 character password with 10 digits
pub fn generate_password() -> Result<String, PasswordError> {
    generate_password_with(PasswordPolicy::default())
}

/// Generate a password for `policy`
///
/// The generator is seeded from the OS CSPRNG for every call.
pub fn generate_password_with(policy: PasswordPolicy) -> Result<String, PasswordError> {
    policy.validate()?;

    let mut seed = <StdRng as SeedableRng>::Seed::default();
    OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|e| PasswordError::Entropy(e.to_string()))?;
    let mut rng = StdRng::from_seed(seed);

    let mut chars: Vec<u8> = DIGITS
        .choose_multiple(&mut rng, policy.digits)
        .chain(LETTERS.choose_multiple(&mut rng, policy.length - policy.digits))
        .copied()
        .collect();
    chars.shuffle(&mut rng);

    Ok(chars.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_passwords_follow_policy() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let password = generate_password().unwrap();
            assert_eq!(password.len(), 32);
            assert!(password.chars().filter(char::is_ascii_digit).count() >= 10);
            let distinct: HashSet<char> = password.chars().collect();
            assert_eq!(distinct.len(), password.len(), "repeated character in {password}");
            seen.insert(password);
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_custom_policy() {
        let password = generate_password_with(PasswordPolicy {
            length: 12,
            digits: 4,
        })
        .unwrap();
        assert_eq!(password.len(), 12);
        assert_eq!(password.chars().filter(char::is_ascii_digit).count(), 4);
    }

    #[test]
    fn test_impossible_policies_are_rejected() {
        for policy in [
            PasswordPolicy { length: 4, digits: 5 },
            PasswordPolicy { length: 20, digits: 11 },
            PasswordPolicy { length: 70, digits: 10 },
        ] {
            assert!(matches!(
                generate_password_with(policy),
                Err(PasswordError::Policy(_))
            ));
        }
    }
}
