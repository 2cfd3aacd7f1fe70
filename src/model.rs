//! Provisioning request domain model.
//!
//! A [`ProvisioningRequest`] is what clients submit and what travels through
//! the queue unchanged. The enums below carry the canonical, case-sensitive
//! spellings used on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cloud-resource provisioning request, as accepted by the API and carried
/// as the queue payload.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProvisioningRequest {
    /// Caller-supplied identifier (1–100 characters).
    pub id: String,
    /// Kind of resource to provision.
    pub resource_type: ResourceType,
    /// Provider that should host the resource.
    pub cloud_provider: CloudProvider,
    /// Opaque configuration blob (1–1000 characters).
    pub specification: String,
    /// Caller-supplied status. Never reconciled with processing outcome.
    pub status: ProvisioningStatus,
    /// Identifier of the submitter (1–100 characters).
    pub requested_by: String,
}

/// Raised when a string does not match any canonical enum spelling.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant in canonical order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the canonical wire spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|variant| variant.as_str() == value)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: value.to_owned(),
                    })
            }
        }
    };
}

wire_enum! {
    /// Kind of cloud resource requested.
    ResourceType, "resource type" {
        /// Virtual machine.
        Vm => "VM",
        /// Managed relational database.
        Rds => "RDS",
        /// Object storage bucket.
        S3 => "S3",
        /// Serverless function.
        Lambda => "Lambda",
        /// Virtual private network.
        Vpc => "VPC",
        /// Load balancer.
        Elb => "ELB",
    }
}

wire_enum! {
    /// Cloud provider hosting the resource.
    CloudProvider, "cloud provider" {
        /// Amazon Web Services.
        Aws => "AWS",
        /// Microsoft Azure.
        Azure => "Azure",
        /// Google Cloud Platform.
        Gcp => "GCP",
    }
}

wire_enum! {
    /// Status carried by a provisioning request.
    ProvisioningStatus, "status" {
        /// Not yet picked up.
        Pending => "pending",
        /// Being worked on.
        InProgress => "in_progress",
        /// Finished successfully.
        Completed => "completed",
        /// Finished unsuccessfully.
        Failed => "failed",
    }
}

impl ProvisioningStatus {
    /// Returns `true` for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Renders the canonical spellings separated by spaces, as used in
/// validation messages (`VM RDS S3 Lambda VPC ELB`).
#[must_use]
pub fn canonical_list<T: Copy + fmt::Display>(variants: &[T]) -> String {
    variants
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
