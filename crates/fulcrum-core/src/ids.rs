//! Core identifier types for Fulcrum.
//!
//! Every entity in the data model carries an opaque 128-bit identifier,
//! rendered externally as a 36-character canonical UUID string. All ID
//! types below share the same representation and the same serde contract
//! (`try_from = "String"`, `into = "String"`) so handlers and store keys
//! can treat them uniformly, while the type system still keeps a
//! `ServiceId` from being accepted where a `JobId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create an id from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the raw bytes of the UUID.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Return the canonical 36-character hyphenated string form.
            #[must_use]
            pub fn to_canonical(&self) -> String {
                self.0.to_string()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id!(
    ParticipantId,
    "A tenant organization, acting as provider and/or consumer."
);
uuid_id!(AgentId, "A worker endpoint owned by a provider.");
uuid_id!(
    AgentTypeId,
    "The type of an agent; determines which service types it supports."
);
uuid_id!(
    ServiceGroupId,
    "A consumer-owned logical grouping of services."
);
uuid_id!(
    ServiceTypeId,
    "The type of a service; carries the property schema."
);
uuid_id!(ServiceId, "A provisioned workload tracked by the state machine.");
uuid_id!(JobId, "A single action dispatched to an agent.");
uuid_id!(EventId, "A single journal record.");

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! roundtrip_test {
        ($fn_name:ident, $ty:ty) => {
            #[test]
            fn $fn_name() {
                let id = <$ty>::generate();
                let s = id.to_string();
                let parsed: $ty = s.parse().unwrap();
                assert_eq!(id, parsed);

                let json = serde_json::to_string(&id).unwrap();
                let from_json: $ty = serde_json::from_str(&json).unwrap();
                assert_eq!(id, from_json);

                assert_eq!(id.to_canonical().len(), 36);
            }
        };
    }

    roundtrip_test!(participant_id_roundtrip, ParticipantId);
    roundtrip_test!(agent_id_roundtrip, AgentId);
    roundtrip_test!(agent_type_id_roundtrip, AgentTypeId);
    roundtrip_test!(service_group_id_roundtrip, ServiceGroupId);
    roundtrip_test!(service_type_id_roundtrip, ServiceTypeId);
    roundtrip_test!(service_id_roundtrip, ServiceId);
    roundtrip_test!(job_id_roundtrip, JobId);
    roundtrip_test!(event_id_roundtrip, EventId);

    #[test]
    fn invalid_uuid_rejected() {
        let result = ServiceId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn distinct_generated_ids() {
        assert_ne!(ServiceId::generate(), ServiceId::generate());
    }
}
