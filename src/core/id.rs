use std::{
    fmt::{
        self,
        Display,
    },
    str::FromStr,
};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::lock::Mutex;
use serde::{
    Deserialize,
    Serialize,
    de::Visitor,
};
use thiserror::Error;

/// An error resulting from an integer being out of range of valid session-scoped IDs.
#[derive(Debug, Error)]
#[error("id {id} is out of range")]
pub struct IdOutOfRange {
    id: u64,
}

/// An ID, which identifies a request, session, or registration.
///
/// IDs are integers between 1 and 2^53, inclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// Minimum allowed ID.
    pub const MIN: u64 = 1;
    /// Maximum allowed ID.
    pub const MAX: u64 = 1 << 53;
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            Err(IdOutOfRange { id: value })
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Id> for u64 {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::try_from(s.parse::<u64>()?)?)
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "an integer between {} and {}", Id::MIN, Id::MAX)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(value).map_err(|_| E::custom(format!("integer {value} is out of range")))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An object that generates [`Id`]s in some well-defined manner.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Generates the next ID.
    async fn generate_id(&self) -> Id;

    /// Resets ID generation.
    async fn reset(&self);
}

/// An [`IdAllocator`] that generates IDs sequentially, starting from 1.
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    id: Mutex<u64>,
}

#[async_trait]
impl IdAllocator for SequentialIdAllocator {
    async fn generate_id(&self) -> Id {
        let mut id = self.id.lock().await;
        *id = id.wrapping_add(1);
        if *id > Id::MAX {
            *id = Id::MIN;
        }
        Id(*id)
    }

    async fn reset(&self) {
        *self.id.lock().await = 0;
    }
}

#[cfg(test)]
mod id_test {
    use crate::core::id::{
        Id,
        IdAllocator,
        SequentialIdAllocator,
    };

    #[test]
    fn validates_range() {
        assert!(Id::try_from(0).is_err());
        assert!(Id::try_from(1).is_ok());
        assert!(Id::try_from(1 << 53).is_ok());
        assert!(Id::try_from((1 << 53) + 1).is_err());
    }

    #[test]
    fn fails_deserialization_out_of_range() {
        assert!(serde_json::from_str::<Id>("1").is_ok());
        assert!(serde_json::from_str::<Id>("0").is_err());
        assert!(serde_json::from_str::<Id>("9007199254740993").is_err());
    }

    #[tokio::test]
    async fn generates_sequential_ids() {
        let allocator = SequentialIdAllocator::default();
        assert_eq!(allocator.generate_id().await, Id(1));
        assert_eq!(allocator.generate_id().await, Id(2));
        assert_eq!(allocator.generate_id().await, Id(3));
        allocator.reset().await;
        assert_eq!(allocator.generate_id().await, Id(1));
    }
}
