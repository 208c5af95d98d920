//! Display-name resolution and meshnet-tag validation (spec C9, §4.6/§4.7).

use relay_ids::MeshNodeId;
use relay_protocol::NodeNames;

/// Resolve a mesh node's display name: long name, then short name, then
/// the synthesized `Node !<hex8>` fallback (delegates to
/// [`relay_protocol::NodeNames::resolve`], the single source of truth for
/// this ordering).
pub fn resolve_mesh_display_name(node_id: MeshNodeId, names: &NodeNames) -> String {
    names.resolve(node_id)
}

/// Resolve a Matrix sender's display name: the room member's display
/// name if set, otherwise the user ID's localpart (`@alice:example.org`
/// -> `alice`).
pub fn resolve_matrix_display_name(user_id: &str, room_display_name: Option<&str>) -> String {
    if let Some(name) = room_display_name {
        if !name.trim().is_empty() {
            return name.to_string();
        }
    }
    user_id
        .strip_prefix('@')
        .and_then(|rest| rest.split(':').next())
        .unwrap_or(user_id)
        .to_string()
}

/// Whether inbound mesh text tagged with `meshnet` originated from our
/// own mesh rather than a bridged one. Own-mesh text should never be
/// re-wrapped in attribution when relayed to Matrix (spec §4.6 step 6);
/// text from any other meshnet should be.
pub fn is_own_meshnet(meshnet: &str, local_meshnet_name: &str) -> bool {
    meshnet == local_meshnet_name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_display_name_prefers_room_display_name() {
        assert_eq!(
            resolve_matrix_display_name("@alice:example.org", Some("Alice")),
            "Alice"
        );
    }

    #[test]
    fn matrix_display_name_falls_back_to_localpart() {
        assert_eq!(resolve_matrix_display_name("@alice:example.org", None), "alice");
    }

    #[test]
    fn matrix_display_name_ignores_blank_room_display_name() {
        assert_eq!(resolve_matrix_display_name("@alice:example.org", Some("  ")), "alice");
    }

    #[test]
    fn own_meshnet_detected_by_exact_match() {
        assert!(is_own_meshnet("M1", "M1"));
        assert!(!is_own_meshnet("M2", "M1"));
    }
}
