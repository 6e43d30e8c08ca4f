use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::PartitionId;
use crate::errors::{NetworkError, Result};

const BLOCKED_PACKET_LOSS: f32 = 100.0;
const UNBLOCKED_PACKET_LOSS: f32 = 0.0;

/// Traffic rule between two partitions
///
/// A connection is expressed as a packet-loss percentage; 100 % is a fully
/// blocked connection and 0 % an unimpaired one. Construct through the named
/// constructors so the percentage is always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    packet_loss_percentage: f32,
}

impl Connection {
    pub fn unblocked() -> Self {
        Self {
            packet_loss_percentage: UNBLOCKED_PACKET_LOSS,
        }
    }

    pub fn blocked() -> Self {
        Self {
            packet_loss_percentage: BLOCKED_PACKET_LOSS,
        }
    }

    /// Partial packet loss
    ///
    /// # Errors
    ///
    /// Returns `InvalidPacketLoss` when `percentage` is NaN or outside `[0, 100]`.
    pub fn with_packet_loss(percentage: f32) -> Result<Self> {
        if !(UNBLOCKED_PACKET_LOSS..=BLOCKED_PACKET_LOSS).contains(&percentage) {
            return Err(NetworkError::InvalidPacketLoss { percentage });
        }
        Ok(Self {
            packet_loss_percentage: percentage,
        })
    }

    pub fn packet_loss_percentage(&self) -> f32 {
        self.packet_loss_percentage
    }

    pub fn is_blocked(&self) -> bool {
        self.packet_loss_percentage >= BLOCKED_PACKET_LOSS
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::unblocked()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blocked() {
            f.write_str("blocked")
        } else {
            write!(f, "packet_loss={}%", self.packet_loss_percentage)
        }
    }
}

/// Unordered pair of partitions a connection rule applies to
///
/// `(a, b)` and `(b, a)` normalise to the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionConnectionId {
    lower: PartitionId,
    upper: PartitionId,
}

impl PartitionConnectionId {
    pub fn new(a: PartitionId, b: PartitionId) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    pub fn partitions(&self) -> (&PartitionId, &PartitionId) {
        (&self.lower, &self.upper)
    }
}

impl fmt::Display for PartitionConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_and_unblocked() {
        assert!(Connection::blocked().is_blocked());
        assert!(!Connection::unblocked().is_blocked());
        assert_eq!(Connection::default(), Connection::unblocked());
    }

    #[test]
    fn test_packet_loss_range_is_enforced() {
        assert!(Connection::with_packet_loss(50.0).is_ok());
        assert!(Connection::with_packet_loss(100.0).unwrap().is_blocked());
        assert!(matches!(
            Connection::with_packet_loss(101.0),
            Err(NetworkError::InvalidPacketLoss { .. })
        ));
        assert!(Connection::with_packet_loss(-1.0).is_err());
        assert!(Connection::with_packet_loss(f32::NAN).is_err());
    }

    #[test]
    fn test_connection_id_is_order_insensitive() {
        let ab = PartitionConnectionId::new("a".into(), "b".into());
        let ba = PartitionConnectionId::new("b".into(), "a".into());
        assert_eq!(ab, ba);
    }
}
