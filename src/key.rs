/*
 * Copyright 2022 Jordan Matelsky
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Generation of project keys.
//!
//! Keys are shared secrets for a low-traffic, low-security scheme. They only need to be hard to
//! guess by a casual observer, so they are drawn from a general-purpose PRNG rather than a
//! cryptographic one.

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use static_assertions::assert_obj_safe;
use uuid::Builder;

/// The symbols a user key is drawn from.
const USER_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// The number of symbols in a user key.
pub const USER_KEY_LEN: usize = 8;

/// The marker every admin key starts with.
pub const ADMIN_KEY_PREFIX: &str = "a-";

/// A source of new project keys.
///
/// Backends hold a `KeyGenerator` so that tests can swap in a deterministic one.
pub trait KeyGenerator: Debug + Send {
    /// Return a new user key.
    ///
    /// This is [`USER_KEY_LEN`] symbols drawn uniformly from the lowercase ASCII letters and
    /// digits.
    fn generate_user_key(&mut self) -> String;

    /// Return a new admin key.
    ///
    /// This is a random UUID in its hyphenated form, prefixed with [`ADMIN_KEY_PREFIX`].
    fn generate_admin_key(&mut self) -> String;
}

assert_obj_safe!(KeyGenerator);

/// A `KeyGenerator` backed by a pseudo-random number generator.
#[derive(Debug, Clone)]
pub struct RandomKeyGenerator {
    rng: StdRng,
}

impl RandomKeyGenerator {
    /// Create a generator seeded from the operating system's entropy source.
    pub fn new() -> Self {
        RandomKeyGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a generator which always produces the same sequence of keys for a given `seed`.
    pub fn seeded(seed: u64) -> Self {
        RandomKeyGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate_user_key(&mut self) -> String {
        (0..USER_KEY_LEN)
            .map(|_| USER_KEY_ALPHABET[self.rng.gen_range(0..USER_KEY_ALPHABET.len())] as char)
            .collect()
    }

    fn generate_admin_key(&mut self) -> String {
        let id = Builder::from_random_bytes(self.rng.gen()).into_uuid();
        format!("{}{}", ADMIN_KEY_PREFIX, id.as_hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use uuid::{Uuid, Version};

    use super::*;

    #[test]
    fn user_keys_use_the_lowercase_alphanumeric_alphabet() {
        let mut keys = RandomKeyGenerator::new();

        for _ in 0..100 {
            let key = keys.generate_user_key();
            assert_eq!(key.len(), USER_KEY_LEN);
            assert!(key
                .bytes()
                .all(|symbol| symbol.is_ascii_lowercase() || symbol.is_ascii_digit()));
        }
    }

    #[test]
    fn admin_keys_are_prefixed_v4_uuids() {
        let mut keys = RandomKeyGenerator::new();
        let key = keys.generate_admin_key();

        let id = key
            .strip_prefix(ADMIN_KEY_PREFIX)
            .expect("Admin key is missing its prefix.");
        let id = Uuid::parse_str(id).expect("Admin key is not a UUID.");
        assert_eq!(id.get_version(), Some(Version::Random));
        assert_eq!(key.len(), ADMIN_KEY_PREFIX.len() + 36);
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let mut first = RandomKeyGenerator::seeded(42);
        let mut second = RandomKeyGenerator::seeded(42);

        assert_eq!(first.generate_user_key(), second.generate_user_key());
        assert_eq!(first.generate_admin_key(), second.generate_admin_key());
    }

    #[test]
    fn consecutive_keys_differ() {
        let mut keys = RandomKeyGenerator::seeded(7);
        assert_ne!(keys.generate_user_key(), keys.generate_user_key());
        assert_ne!(keys.generate_admin_key(), keys.generate_admin_key());
    }
}
