//! Deterministic dataset generators.
//!
//! The user dataset mirrors the shape the query suites exercise:
//! a string email, unsigned age, signed balance, a nested zip code,
//! and a last-login instant in nanoseconds since the Unix epoch.

use nestdb_core::{Collection, Result, Selector, ValueKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const FIRST_NAMES: &[&str] = &[
    "amelie", "bruno", "carol", "dwight", "elena", "fritz", "gödel", "hanna", "ivan", "jules",
    "karim", "lena", "milan", "nora", "otto", "priya", "quentin", "rosa", "stefan", "tamar",
];

const HOSTS: &[&str] = &[
    "alamogordo",
    "bremen",
    "coimbra",
    "dresden",
    "eldoret",
    "fukuoka",
    "gdansk",
    "helsinki",
    "ithaca",
    "jaipur",
    "kuznetsk",
    "lisbon",
    "muppet",
    "nantes",
    "odessa",
    "puget",
    "quito",
    "rudolph",
    "sapporo",
    "tbilisi",
];

/// 2016-01-01T00:00:00Z in nanoseconds since the Unix epoch.
const LOGIN_BASE_NANOS: i64 = 1_451_606_400_000_000_000;

/// Roughly three years of login jitter.
const LOGIN_SPREAD_NANOS: i64 = 94_670_856_000_000_000;

/// A nested address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// City name.
    #[serde(rename = "City")]
    pub city: String,
    /// Zip code.
    #[serde(rename = "ZipCode")]
    pub zip_code: u64,
}

/// A generated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Record id, also used as the collection key.
    #[serde(rename = "ID")]
    pub id: String,
    /// Unique email address.
    #[serde(rename = "Email")]
    pub email: String,
    /// Account balance; may be negative.
    #[serde(rename = "Balance")]
    pub balance: i64,
    /// Nested address.
    #[serde(rename = "Address")]
    pub address: Address,
    /// Age in years.
    #[serde(rename = "Age")]
    pub age: u64,
    /// Last login, nanoseconds since the Unix epoch.
    #[serde(rename = "LastLogin")]
    pub last_login: i64,
}

/// Generates `count` users deterministically from `seed`.
///
/// Ids are `"0"`, `"1"`, ... in order; emails embed the record index
/// and are therefore unique within one dataset. Different seeds model
/// different "versions" of the same user population.
#[must_use]
pub fn user_dataset(seed: u64, count: usize) -> Vec<User> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let name = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
            let host = HOSTS[rng.gen_range(0..HOSTS.len())];
            let city = HOSTS[rng.gen_range(0..HOSTS.len())];
            User {
                id: i.to_string(),
                email: format!("{name}-{i}@{host}.com"),
                balance: rng.gen_range(-1_000_000_000_000_000_000..1_000_000_000_000_000_000),
                address: Address {
                    city: {
                        let mut chars = city.chars();
                        chars
                            .next()
                            .map(|c| c.to_uppercase().collect::<String>() + chars.as_str())
                            .unwrap_or_default()
                    },
                    zip_code: rng.gen_range(50..100),
                },
                age: rng.gen_range(0..100),
                last_login: LOGIN_BASE_NANOS + rng.gen_range(0..LOGIN_SPREAD_NANOS),
            }
        })
        .collect()
}

/// Declares the index set the query suites assume: `email`, `age`,
/// `balance`, `zip` (nested) and `last_login`.
pub fn standard_indexes(collection: &Collection) -> Result<()> {
    collection.set_index("email", ValueKind::Text, Selector::new(["Email"])?)?;
    collection.set_index("age", ValueKind::Uint, Selector::new(["Age"])?)?;
    collection.set_index("balance", ValueKind::Int, Selector::new(["Balance"])?)?;
    collection.set_index("zip", ValueKind::Uint, Selector::new(["Address", "ZipCode"])?)?;
    collection.set_index("last_login", ValueKind::Time, Selector::new(["LastLogin"])?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_is_deterministic() {
        assert_eq!(user_dataset(7, 20), user_dataset(7, 20));
        assert_ne!(user_dataset(7, 20), user_dataset(8, 20));
    }

    #[test]
    fn emails_are_unique() {
        let users = user_dataset(1, 300);
        let mut emails: Vec<&str> = users.iter().map(|u| u.email.as_str()).collect();
        emails.sort_unstable();
        emails.dedup();
        assert_eq!(emails.len(), 300);
    }

    #[test]
    fn zip_codes_stay_in_range() {
        for user in user_dataset(2, 100) {
            assert!((50..100).contains(&user.address.zip_code));
        }
    }
}
