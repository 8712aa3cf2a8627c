//! Embedded wire protocol carried inside plain chat text.
//!
//! Three structured sub-protocols piggy-back on ordinary messages,
//! distinguished by a marker prefix: role updates, supply requests, and
//! emergency alerts. The wire form stays plain text for interoperability
//! with the existing transport; this module is the single place that
//! encodes and decodes it.

use serde::{Deserialize, Serialize};

use crate::constants::{EMERGENCY_MARKER, ROLE_UPDATE_MARKER, SUPPLY_REQUEST_MARKER};
use crate::error::ProtocolError;
use crate::types::{PeerId, Role};

/// A peer announcing its own coordination role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleUpdate {
    pub peer_id: PeerId,
    pub role: Role,
    /// Epoch millis at the sender; used for last-write-wins resolution.
    pub timestamp: i64,
}

/// A peer asking the group for an item. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplyRequest {
    pub peer_id: PeerId,
    pub item: String,
    pub timestamp: i64,
}

/// A high-priority alert. The free-text field may contain colons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmergencyAlert {
    pub peer_id: PeerId,
    pub role: Role,
    pub message: String,
    pub timestamp: i64,
}

/// Classification of an inbound message's text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    RoleUpdate(RoleUpdate),
    SupplyRequest(SupplyRequest),
    EmergencyAlert(EmergencyAlert),
    /// Ordinary human-readable chat.
    Plain,
}

/// Classify `content` and extract fields for the structured kinds.
///
/// `transport_sender` is the peer id the transport reports for the event.
/// A ROLE_UPDATE whose embedded peer id differs from it is rejected as
/// [`ProtocolError::SpoofedSender`]; a peer cannot claim another peer's
/// role. Supply requests and emergency alerts carry the claimed id through
/// unchecked since they never mutate identity state.
pub fn decode(content: &str, transport_sender: &PeerId) -> Result<Payload, ProtocolError> {
    if let Some(rest) = content.strip_prefix(ROLE_UPDATE_MARKER) {
        return decode_role_update(rest, transport_sender).map(Payload::RoleUpdate);
    }
    if let Some(rest) = content.strip_prefix(SUPPLY_REQUEST_MARKER) {
        return decode_supply_request(rest).map(Payload::SupplyRequest);
    }
    if let Some(rest) = content.strip_prefix(EMERGENCY_MARKER) {
        return decode_emergency(rest).map(Payload::EmergencyAlert);
    }
    Ok(Payload::Plain)
}

fn decode_role_update(rest: &str, transport_sender: &PeerId) -> Result<RoleUpdate, ProtocolError> {
    let fields: Vec<&str> = rest.split(':').collect();
    if fields.len() != 3 {
        return Err(ProtocolError::MalformedPayload(format!(
            "role update expects 3 fields, got {}",
            fields.len()
        )));
    }
    let role = parse_role(fields[1])?;
    let timestamp = parse_timestamp(fields[2])?;
    if fields[0] != transport_sender.as_str() {
        return Err(ProtocolError::SpoofedSender {
            claimed: fields[0].to_string(),
            actual: transport_sender.to_string(),
        });
    }
    Ok(RoleUpdate {
        peer_id: PeerId::from(fields[0]),
        role,
        timestamp,
    })
}

fn decode_supply_request(rest: &str) -> Result<SupplyRequest, ProtocolError> {
    let fields: Vec<&str> = rest.split(':').collect();
    if fields.len() != 3 {
        return Err(ProtocolError::MalformedPayload(format!(
            "supply request expects 3 fields, got {}",
            fields.len()
        )));
    }
    if fields[1].is_empty() {
        return Err(ProtocolError::MalformedPayload("empty item".into()));
    }
    Ok(SupplyRequest {
        peer_id: PeerId::from(fields[0]),
        item: fields[1].to_string(),
        timestamp: parse_timestamp(fields[2])?,
    })
}

// The alert text may itself contain colons, so the split count is limited:
// two fields from the front, the timestamp from the back, everything in
// between is the message verbatim.
fn decode_emergency(rest: &str) -> Result<EmergencyAlert, ProtocolError> {
    let mut front = rest.splitn(3, ':');
    let peer_id = front.next().unwrap_or_default();
    let role_field = front
        .next()
        .ok_or_else(|| ProtocolError::MalformedPayload("emergency missing role".into()))?;
    let remainder = front
        .next()
        .ok_or_else(|| ProtocolError::MalformedPayload("emergency missing message".into()))?;
    let (message, ts_field) = remainder
        .rsplit_once(':')
        .ok_or_else(|| ProtocolError::MalformedPayload("emergency missing timestamp".into()))?;

    Ok(EmergencyAlert {
        peer_id: PeerId::from(peer_id),
        role: parse_role(role_field)?,
        message: message.to_string(),
        timestamp: parse_timestamp(ts_field)?,
    })
}

fn parse_role(field: &str) -> Result<Role, ProtocolError> {
    Role::from_wire(field)
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("unknown role {field:?}")))
}

fn parse_timestamp(field: &str) -> Result<i64, ProtocolError> {
    field
        .parse::<i64>()
        .map_err(|_| ProtocolError::MalformedPayload(format!("non-numeric timestamp {field:?}")))
}

/// Encode a role update for outbound broadcast.
pub fn encode_role_update(peer_id: &PeerId, role: Role, timestamp: i64) -> String {
    format!("{ROLE_UPDATE_MARKER}{peer_id}:{}:{timestamp}", role.as_wire())
}

/// Encode a supply request for outbound broadcast.
pub fn encode_supply_request(peer_id: &PeerId, item: &str, timestamp: i64) -> String {
    format!("{SUPPLY_REQUEST_MARKER}{peer_id}:{item}:{timestamp}")
}

/// Encode an emergency alert for outbound broadcast.
pub fn encode_emergency(peer_id: &PeerId, role: Role, message: &str, timestamp: i64) -> String {
    format!(
        "{EMERGENCY_MARKER}{peer_id}:{}:{message}:{timestamp}",
        role.as_wire()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> PeerId {
        PeerId::from(id)
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(decode("hello everyone", &p("P1")), Ok(Payload::Plain));
        // Markers are prefixes, not substrings
        assert_eq!(
            decode("forwarding: ROLE_UPDATE:P1:medic:1000", &p("P1")),
            Ok(Payload::Plain)
        );
    }

    #[test]
    fn test_role_update_roundtrip() {
        let wire = encode_role_update(&p("P1"), Role::Medic, 1000);
        assert_eq!(wire, "ROLE_UPDATE:P1:medic:1000");
        let decoded = decode(&wire, &p("P1")).unwrap();
        assert_eq!(
            decoded,
            Payload::RoleUpdate(RoleUpdate {
                peer_id: p("P1"),
                role: Role::Medic,
                timestamp: 1000,
            })
        );
    }

    #[test]
    fn test_role_update_spoof_rejected() {
        let err = decode("ROLE_UPDATE:P1:medic:1000", &p("P2")).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::SpoofedSender {
                claimed: "P1".into(),
                actual: "P2".into(),
            }
        );
    }

    #[test]
    fn test_role_update_malformed() {
        assert!(matches!(
            decode("ROLE_UPDATE:P1:medic", &p("P1")),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode("ROLE_UPDATE:P1:wizard:1000", &p("P1")),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode("ROLE_UPDATE:P1:medic:soon", &p("P1")),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_supply_request_roundtrip() {
        let wire = encode_supply_request(&p("P3"), "water filters", 42);
        let decoded = decode(&wire, &p("P3")).unwrap();
        assert_eq!(
            decoded,
            Payload::SupplyRequest(SupplyRequest {
                peer_id: p("P3"),
                item: "water filters".into(),
                timestamp: 42,
            })
        );
    }

    #[test]
    fn test_supply_request_wrong_field_count() {
        assert!(matches!(
            decode("SUPPLY_REQUEST:P3:water:bottles:42", &p("P3")),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_emergency_message_keeps_embedded_colons() {
        let decoded = decode(
            "EMERGENCY:P1:leader:evac now: north exit:1700000000000",
            &p("P1"),
        )
        .unwrap();
        assert_eq!(
            decoded,
            Payload::EmergencyAlert(EmergencyAlert {
                peer_id: p("P1"),
                role: Role::Leader,
                message: "evac now: north exit".into(),
                timestamp: 1_700_000_000_000,
            })
        );
    }

    #[test]
    fn test_emergency_roundtrip() {
        let wire = encode_emergency(&p("P2"), Role::Scout, "bridge out", 7);
        let decoded = decode(&wire, &p("P2")).unwrap();
        assert_eq!(
            decoded,
            Payload::EmergencyAlert(EmergencyAlert {
                peer_id: p("P2"),
                role: Role::Scout,
                message: "bridge out".into(),
                timestamp: 7,
            })
        );
    }

    #[test]
    fn test_emergency_malformed() {
        assert!(matches!(
            decode("EMERGENCY:P1:leader", &p("P1")),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode("EMERGENCY:P1:leader:help:not-a-number", &p("P1")),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
