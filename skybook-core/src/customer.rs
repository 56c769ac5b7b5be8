use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use skybook_shared::Masked;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    Active,
    Disabled,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "ACTIVE",
            CustomerStatus::Disabled => "DISABLED",
        }
    }
}

impl FromStr for CustomerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(CustomerStatus::Active),
            "DISABLED" => Ok(CustomerStatus::Disabled),
            other => Err(format!("unknown customer status '{}'", other)),
        }
    }
}

/// A person who can hold bookings. Created once, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub identity_document: Option<Masked<String>>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub membership_card: Option<String>,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(profile: CustomerProfile) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: profile.name,
            email: non_blank(profile.email),
            phone: non_blank(profile.phone),
            identity_document: non_blank(profile.identity_document),
            date_of_birth: profile.date_of_birth,
            address: profile.address,
            membership_card: profile.membership_card,
            status: CustomerStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }

    /// Merge a partial update. Only fields present in the patch are touched.
    pub fn apply(&mut self, patch: CustomerPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = non_blank(Some(email));
        }
        if let Some(phone) = patch.phone {
            self.phone = non_blank(Some(phone));
        }
        if let Some(doc) = patch.identity_document {
            self.identity_document = non_blank(Some(doc));
        }
        if let Some(dob) = patch.date_of_birth {
            self.date_of_birth = Some(dob);
        }
        if let Some(address) = patch.address {
            self.address = Some(address);
        }
        if let Some(card) = patch.membership_card {
            self.membership_card = Some(card);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
    }

    /// Every identity key this customer can be found by, in lookup priority.
    pub fn match_keys(&self) -> Vec<MatchKey> {
        MatchKeys {
            email: self.email.clone(),
            phone: self.phone.clone(),
            identity_document: self.identity_document.clone(),
        }
        .keys()
    }
}

fn non_blank(value: Option<Masked<String>>) -> Option<Masked<String>> {
    value.filter(|v| !v.is_blank())
}

/// Attributes supplied when a guest books without an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub identity_document: Option<Masked<String>>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub membership_card: Option<String>,
}

/// Partial update. `None` leaves the stored value untouched; `Some("")` on a
/// contact field clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub identity_document: Option<Masked<String>>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub membership_card: Option<String>,
    pub status: Option<CustomerStatus>,
}

/// A single identity key usable for deduplication.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Email(String),
    Phone(String),
    IdentityDocument(String),
}

impl MatchKey {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchKey::Email(_) => "email",
            MatchKey::Phone(_) => "phone",
            MatchKey::IdentityDocument(_) => "identity_document",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            MatchKey::Email(v) | MatchKey::Phone(v) | MatchKey::IdentityDocument(v) => v,
        }
    }
}

impl fmt::Debug for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchKey::{}(********)", self.kind())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchKeys {
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub identity_document: Option<Masked<String>>,
}

impl MatchKeys {
    pub fn from_profile(profile: &CustomerProfile) -> Self {
        Self {
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            identity_document: profile.identity_document.clone(),
        }
    }

    /// Non-blank keys ordered email, phone, identity document.
    pub fn keys(&self) -> Vec<MatchKey> {
        let mut keys = Vec::with_capacity(3);
        if let Some(email) = self.email.as_ref().filter(|v| !v.is_blank()) {
            keys.push(MatchKey::Email(email.as_str().to_string()));
        }
        if let Some(phone) = self.phone.as_ref().filter(|v| !v.is_blank()) {
            keys.push(MatchKey::Phone(phone.as_str().to_string()));
        }
        if let Some(doc) = self.identity_document.as_ref().filter(|v| !v.is_blank()) {
            keys.push(MatchKey::IdentityDocument(doc.as_str().to_string()));
        }
        keys
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub identity_document: Option<String>,
    pub membership_card: Option<String>,
    pub status: Option<CustomerStatus>,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        fn eq(filter: &Option<String>, value: Option<&str>) -> bool {
            match filter {
                Some(f) => value == Some(f.as_str()),
                None => true,
            }
        }

        eq(&self.name, Some(customer.name.as_str()))
            && eq(&self.email, customer.email.as_ref().map(|v| v.as_str()))
            && eq(&self.phone, customer.phone.as_ref().map(|v| v.as_str()))
            && eq(&self.identity_document, customer.identity_document.as_ref().map(|v| v.as_str()))
            && eq(&self.membership_card, customer.membership_card.as_deref())
            && self.status.map_or(true, |s| s == customer.status)
    }
}
