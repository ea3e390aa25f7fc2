//! Serializable figure descriptions.
//!
//! A description is what a file loader hands the engine: root transform,
//! skin arrays and a nested node tree. Displacers are declared once at the
//! top level and referenced by name from joints and segments.

use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::SkeletonError;
use crate::humanoid::Humanoid;
use crate::ids::DisplacerId;
use crate::protocol::NodeRef;
use crate::segment::DisplacementOrder;
use crate::transform::Trs;
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureDescription {
    pub name: Option<String>,
    pub version: Option<String>,
    pub info: Vec<String>,
    pub transform: Trs,
    pub skin_coord: Vec<f32>,
    pub skin_normal: Vec<f32>,
    pub displacers: Vec<DisplacerDescription>,
    pub skeleton: Vec<NodeDescription>,
    pub viewpoints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDescription {
    Joint(JointDescription),
    Site(SiteDescription),
    Segment(SegmentDescription),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointDescription {
    pub name: Option<String>,
    pub transform: Trs,
    pub skin_coord_index: Vec<u32>,
    pub skin_coord_weight: Vec<f32>,
    pub displacers: Vec<String>,
    pub children: Vec<NodeDescription>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteDescription {
    pub name: Option<String>,
    pub transform: Trs,
    pub children: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentDescription {
    pub name: Option<String>,
    pub mass: Option<f32>,
    pub center_of_mass: Option<[f32; 3]>,
    pub coord_start: usize,
    pub coord_count: usize,
    pub displacement_order: DisplacementOrder,
    pub displacers: Vec<String>,
    pub children: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplacerDescription {
    pub name: String,
    #[serde(default)]
    pub coord_index: Vec<u32>,
    #[serde(default)]
    pub displacements: Vec<f32>,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl FigureDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Humanoid<Vec<f32>> {
    /// Build and wire a complete figure. The result still needs one
    /// `update_skeleton` call before its outputs are populated.
    pub fn from_description(cfg: Config, desc: &FigureDescription) -> Result<Self> {
        let mut fig = Humanoid::new(cfg);
        fig.set_name(desc.name.as_deref());
        fig.set_version(desc.version.as_deref());
        fig.set_info(&desc.info, desc.info.len())?;
        fig.set_viewpoints(&desc.viewpoints, desc.viewpoints.len())?;
        fig.set_transform(&desc.transform);

        if desc.skin_coord.len() % 3 != 0 || desc.skin_normal.len() % 3 != 0 {
            return Err(SkeletonError::Description {
                reason: "skin arrays must hold whole xyz triples".into(),
            });
        }
        fig.set_skin_coord(&desc.skin_coord, desc.skin_coord.len() / 3)?;
        fig.set_skin_normal(&desc.skin_normal, desc.skin_normal.len() / 3)?;

        let mut displacers = HashMap::with_capacity(desc.displacers.len());
        for d in &desc.displacers {
            let id = fig.create_displacer(Some(&d.name));
            let mut edit = fig.displacer_mut(id)?;
            edit.set_coord_index(&d.coord_index, d.coord_index.len())?;
            edit.set_displacements(&d.displacements, d.displacements.len() / 3)?;
            edit.set_weight(d.weight);
            if displacers.insert(d.name.clone(), id).is_some() {
                return Err(SkeletonError::Description {
                    reason: format!("displacer {} declared twice", d.name),
                });
            }
        }

        let mut builder = Builder {
            fig: &mut fig,
            displacers: &displacers,
        };
        let mut skeleton = Vec::with_capacity(desc.skeleton.len());
        for node in &desc.skeleton {
            skeleton.push(builder.build(node)?);
        }
        fig.set_skeleton(&skeleton, skeleton.len())?;

        debug!(
            "built figure {:?}: {} joints, {} skin vertices",
            fig.name(),
            fig.joints.len(),
            fig.num_skin_coord()
        );
        Ok(fig)
    }
}

struct Builder<'a> {
    fig: &'a mut Humanoid,
    displacers: &'a HashMap<String, DisplacerId>,
}

impl Builder<'_> {
    fn displacer(&self, name: &str) -> Result<DisplacerId> {
        self.displacers
            .get(name)
            .copied()
            .ok_or_else(|| SkeletonError::Description {
                reason: format!("unknown displacer {name}"),
            })
    }

    fn build(&mut self, node: &NodeDescription) -> Result<NodeRef> {
        match node {
            NodeDescription::Joint(desc) => {
                let mut children = Vec::with_capacity(desc.children.len());
                for child in &desc.children {
                    children.push(self.build(child)?);
                }
                let ids = desc
                    .displacers
                    .iter()
                    .map(|name| self.displacer(name))
                    .collect::<Result<Vec<_>>>()?;

                let id = self.fig.create_joint(desc.name.as_deref());
                let mut edit = self.fig.joint_mut(id)?;
                edit.set_transform(&desc.transform);
                edit.set_skin_coord_index(&desc.skin_coord_index, desc.skin_coord_index.len())?;
                if !desc.skin_coord_weight.is_empty() {
                    edit.set_skin_coord_weight(&desc.skin_coord_weight)?;
                }
                edit.set_displacers(&ids, ids.len())?;
                edit.set_children(&children, children.len())?;
                Ok(id.into())
            }
            NodeDescription::Site(desc) => {
                let id = self.fig.create_site(desc.name.as_deref());
                let mut edit = self.fig.site_mut(id)?;
                edit.set_transform(&desc.transform);
                edit.set_children(&desc.children, desc.children.len())?;
                Ok(id.into())
            }
            NodeDescription::Segment(desc) => {
                let ids = desc
                    .displacers
                    .iter()
                    .map(|name| self.displacer(name))
                    .collect::<Result<Vec<_>>>()?;

                let id = self.fig.create_segment(desc.name.as_deref());
                let mut edit = self.fig.segment_mut(id)?;
                if let Some(mass) = desc.mass {
                    edit.set_mass(mass);
                }
                if let Some(com) = desc.center_of_mass {
                    edit.set_center_of_mass(&com)?;
                }
                edit.set_coord_range(desc.coord_start, desc.coord_count)?;
                edit.set_displacement_order(desc.displacement_order);
                edit.set_displacers(&ids, ids.len())?;
                edit.set_children(&desc.children, desc.children.len())?;
                Ok(id.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: &str = r#"{
        "name": "arm",
        "skin_coord": [0, 0, 0, 1, 0, 0],
        "skeleton": [
            { "type": "joint", "name": "shoulder",
              "skin_coord_index": [0], "skin_coord_weight": [1.0],
              "children": [
                { "type": "joint", "name": "elbow",
                  "transform": { "translation": [1, 0, 0] },
                  "skin_coord_index": [1], "skin_coord_weight": [1.0],
                  "children": [ { "type": "site", "name": "wrist" } ] }
              ] }
        ]
    }"#;

    #[test]
    fn nested_joints_are_wired() {
        let desc = FigureDescription::from_json(ARM).unwrap();
        let fig = Humanoid::from_description(Config::default(), &desc).unwrap();
        let shoulder = fig.find_joint("shoulder").unwrap();
        let elbow = fig.find_joint("elbow").unwrap();
        assert_eq!(fig.root_joint(), Some(shoulder));
        assert_eq!(fig.joint(elbow).unwrap().translation(), [1.0, 0.0, 0.0]);
        assert!(fig.find_site("wrist").is_some());
        assert_eq!(fig.num_skin_coord(), 2);
    }

    #[test]
    fn unknown_displacer_names_fail() {
        let text = r#"{ "skeleton": [ { "type": "joint", "displacers": ["nope"] } ] }"#;
        let desc = FigureDescription::from_json(text).unwrap();
        let err = Humanoid::from_description(Config::default(), &desc).unwrap_err();
        assert_eq!(err.category(), "description");
    }

    #[test]
    fn segments_cannot_sit_in_the_skeleton() {
        let text = r#"{ "skeleton": [ { "type": "segment" } ] }"#;
        let desc = FigureDescription::from_json(text).unwrap();
        let err = Humanoid::from_description(Config::default(), &desc).unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidChildType { .. }));
    }

    #[test]
    fn malformed_json_is_a_description_error() {
        let err = FigureDescription::from_json("{ \"skeleton\": 3 }").unwrap_err();
        assert_eq!(err.category(), "description");
    }
}
