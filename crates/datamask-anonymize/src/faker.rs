//! Value generation backed by the `fake` crate.

use std::fmt;

use datamask_core::Value;
use fake::Fake;
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, PostCode, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{FreeEmail, SafeEmail, Username};
use fake::faker::job::en::Title as JobTitle;
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::uuid::UUIDv4;
use rand::RngCore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of synthetic value produced by a [`ValueSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FakeKind {
    FirstName,
    LastName,
    FullName,
    Email,
    SafeEmail,
    Phone,
    City,
    StreetAddress,
    Postcode,
    Country,
    Company,
    JobTitle,
    Username,
    Word,
    Sentence,
    Uuid,
}

impl FakeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FakeKind::FirstName => "first_name",
            FakeKind::LastName => "last_name",
            FakeKind::FullName => "full_name",
            FakeKind::Email => "email",
            FakeKind::SafeEmail => "safe_email",
            FakeKind::Phone => "phone",
            FakeKind::City => "city",
            FakeKind::StreetAddress => "street_address",
            FakeKind::Postcode => "postcode",
            FakeKind::Country => "country",
            FakeKind::Company => "company",
            FakeKind::JobTitle => "job_title",
            FakeKind::Username => "username",
            FakeKind::Word => "word",
            FakeKind::Sentence => "sentence",
            FakeKind::Uuid => "uuid",
        }
    }
}

impl fmt::Display for FakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces domain-plausible synthetic values on demand.
pub trait ValueSource: Send + Sync {
    fn generate(&self, kind: FakeKind, rng: &mut dyn RngCore) -> Value;
}

/// [`ValueSource`] using the English `fake` locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeSource;

impl ValueSource for FakeSource {
    fn generate(&self, kind: FakeKind, rng: &mut dyn RngCore) -> Value {
        let text: String = match kind {
            FakeKind::FirstName => FirstName().fake_with_rng(rng),
            FakeKind::LastName => LastName().fake_with_rng(rng),
            FakeKind::FullName => Name().fake_with_rng(rng),
            FakeKind::Email => FreeEmail().fake_with_rng(rng),
            FakeKind::SafeEmail => SafeEmail().fake_with_rng(rng),
            FakeKind::Phone => PhoneNumber().fake_with_rng(rng),
            FakeKind::City => CityName().fake_with_rng(rng),
            FakeKind::StreetAddress => {
                let number: String = BuildingNumber().fake_with_rng(rng);
                let street: String = StreetName().fake_with_rng(rng);
                format!("{number} {street}")
            }
            FakeKind::Postcode => PostCode().fake_with_rng(rng),
            FakeKind::Country => CountryName().fake_with_rng(rng),
            FakeKind::Company => CompanyName().fake_with_rng(rng),
            FakeKind::JobTitle => JobTitle().fake_with_rng(rng),
            FakeKind::Username => Username().fake_with_rng(rng),
            FakeKind::Word => Word().fake_with_rng(rng),
            FakeKind::Sentence => Sentence(3..8).fake_with_rng(rng),
            FakeKind::Uuid => {
                let id: uuid::Uuid = UUIDv4.fake_with_rng(rng);
                id.to_string()
            }
        };
        Value::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn same_seed_same_values() {
        let mut first = ChaCha8Rng::seed_from_u64(11);
        let mut second = ChaCha8Rng::seed_from_u64(11);
        for kind in [FakeKind::FullName, FakeKind::Email, FakeKind::City] {
            assert_eq!(
                FakeSource.generate(kind, &mut first),
                FakeSource.generate(kind, &mut second)
            );
        }
    }

    #[test]
    fn emails_and_uuids_look_right() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let email = FakeSource.generate(FakeKind::SafeEmail, &mut rng);
        assert!(email.as_str().is_some_and(|value| value.contains('@')));
        let id = FakeSource.generate(FakeKind::Uuid, &mut rng);
        let parsed = id.as_str().map(uuid::Uuid::parse_str);
        assert!(matches!(parsed, Some(Ok(_))));
    }
}
