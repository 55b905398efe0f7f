//! Node group assignment for flexbodies and props
//!
//! A node belongs to an attachment's group when it is one of the attachment's
//! three frame nodes or listed in its forset. The target simulator only
//! deforms a flexbody with the nodes that carry its group, so the member set
//! has to be exhaustive.

use std::collections::HashSet;

use tracing::debug;

use crate::names::unique_group_tag;
use crate::rig::{AttachmentKind, NodeId, Rig};

/// Ratio of the search radius to the frame-node radius when inferring members
const INFERENCE_RADIUS_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSummary {
    /// Distinct group tags assigned
    pub groups: usize,
    /// Node/group memberships added
    pub memberships: usize,
    /// Members that came from proximity inference
    pub inferred: usize,
}

/// Assign group tags to every attachment and its member nodes
///
/// Must run after mesh names are resolved; tags derive from the resolved name.
pub fn resolve_node_groups(rig: &mut Rig, infer_members: bool) -> GroupSummary {
    let mut summary = GroupSummary::default();
    let mut tags = HashSet::new();

    for index in 0..rig.attachments.len() {
        let attachment = &rig.attachments[index];
        let tag = unique_group_tag(&attachment.resolved_mesh, attachment.kind, &mut tags);

        let mut members: Vec<NodeId> = Vec::new();
        let mut seen = HashSet::new();
        let listed = attachment
            .frame_nodes()
            .into_iter()
            .chain(&attachment.forset_nodes);
        for id in listed {
            if seen.insert(id.clone()) {
                members.push(id.clone());
            }
        }

        if infer_members && attachment.kind == AttachmentKind::Flexbody && attachment.forset.is_empty() {
            for id in infer_nearby_nodes(rig, index) {
                if seen.insert(id.clone()) {
                    members.push(id);
                    summary.inferred += 1;
                }
            }
        }

        for id in &members {
            if let Some(node) = rig.node_mut(id) {
                if node.add_group(&tag) {
                    summary.memberships += 1;
                }
            }
        }

        debug!(group = %tag, members = members.len(), "Resolved node group");
        let attachment = &mut rig.attachments[index];
        attachment.group = Some(tag);
        attachment.members = members;
    }

    summary.groups = tags.len();
    summary
}

/// Nodes within twice the frame radius of the frame centroid
fn infer_nearby_nodes(rig: &Rig, index: usize) -> Vec<NodeId> {
    let attachment = &rig.attachments[index];
    let frame: Vec<[f64; 3]> = attachment
        .frame_nodes()
        .into_iter()
        .filter_map(|id| rig.node(id).map(|n| n.position))
        .collect();
    if frame.len() < 3 {
        return Vec::new();
    }

    let centroid = [0, 1, 2].map(|axis| frame.iter().map(|p| p[axis]).sum::<f64>() / 3.0);
    let distance = |p: &[f64; 3]| {
        (0..3)
            .map(|axis| (p[axis] - centroid[axis]).powi(2))
            .sum::<f64>()
            .sqrt()
    };
    let radius = frame.iter().map(distance).fold(0.0, f64::max) * INFERENCE_RADIUS_FACTOR;

    rig.nodes
        .iter()
        .filter(|n| distance(&n.position) <= radius)
        .map(|n| n.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::resolve_mesh_names;
    use crate::parser::parse_rig;
    use crate::report::ConversionReport;
    use crate::settings::ConversionSettings;

    fn rig(src: &str) -> Rig {
        let mut report = ConversionReport::default();
        let mut rig = parse_rig(src, &ConversionSettings::default(), &mut report);
        resolve_mesh_names(&mut rig);
        rig
    }

    const BASE: &str = "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\n4,5,5,5\n5,0.2,0.2,0\n6,9,9,9\nbeams\n1,2\n";

    #[test]
    fn test_members_are_frame_plus_forset() {
        let mut rig = rig(&format!(
            "{}flexbodies\n1,2,3,0,0,0,0,0,0,Body.mesh\nforset 3, 5\n",
            BASE
        ));
        let summary = resolve_node_groups(&mut rig, false);
        let fb = &rig.attachments[0];
        assert_eq!(fb.group.as_deref(), Some("body_flexbody"));
        let ids: Vec<&str> = fb.members.iter().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["node1", "node2", "node3", "node4", "node6"]);
        assert_eq!(summary.memberships, 5);
        assert!(rig.nodes[4].groups.is_empty());
    }

    #[test]
    fn test_exhaustive_membership_and_multiple_groups() {
        let mut rig = rig(&format!(
            "{}flexbodies\n1,2,3,0,0,0,0,0,0,Body.mesh\nforset 1-4\nprops\n1,2,3,0,0,0,0,0,0,Seat.mesh\n",
            BASE
        ));
        let summary = resolve_node_groups(&mut rig, false);
        assert_eq!(summary.groups, 2);
        for attachment in &rig.attachments {
            let tag = attachment.group.as_ref().unwrap();
            for id in &attachment.members {
                let node = rig.node(id).unwrap();
                assert!(node.groups.contains(tag));
            }
        }
        assert_eq!(rig.nodes[0].groups, vec!["body_flexbody", "seat_prop"]);
    }

    #[test]
    fn test_duplicate_meshes_get_distinct_groups() {
        let mut rig = rig(&format!(
            "{}flexbodies\n1,2,3,0,0,0,0,0,0,Wheel.mesh\n4,5,6,0,0,0,0,0,0,WHEEL.mesh\n",
            BASE
        ));
        resolve_node_groups(&mut rig, false);
        assert_eq!(rig.attachments[0].group.as_deref(), Some("wheel_flexbody"));
        assert_eq!(rig.attachments[1].group.as_deref(), Some("wheel_001_flexbody"));
    }

    #[test]
    fn test_inference_adds_nearby_nodes_only_without_forset() {
        let src = format!("{}flexbodies\n1,2,3,0,0,0,0,0,0,Body.mesh\n", BASE);
        let mut inferred = rig(&src);
        let summary = resolve_node_groups(&mut inferred, true);
        let ids: Vec<&str> = inferred.attachments[0].members.iter().map(NodeId::as_str).collect();
        assert!(ids.contains(&"node5"));
        assert!(!ids.contains(&"node4"));
        assert_eq!(summary.inferred, 1);

        let mut plain = rig(&src);
        resolve_node_groups(&mut plain, false);
        assert_eq!(plain.attachments[0].members.len(), 3);
    }
}
