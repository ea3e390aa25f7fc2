//! Humanoid: figure root, node arenas and the per-frame update.
//!
//! The Humanoid owns every node of one figure, the shared skin arrays, the
//! two output sinks and the skinning scratch. External code holds typed
//! handles and edits nodes through the borrow-scoped editors in
//! [`crate::editor`], which report changes back here through
//! [`ObjectParent`].
//!
//! `update_skeleton` runs in four states:
//! - clean: nothing queued and the root matrix unchanged, return at once;
//! - matrix dirty: recompose the root matrix, then walk the root joint;
//! - skeleton dirty: walk the root joint without touching the root matrix;
//! - children dirty: refresh queued skeleton-level sites.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::{debug, trace, warn};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::displacer::Displacer;
use crate::error::SkeletonError;
use crate::fields::{replace_valid, triple_len, vec3_arg};
use crate::ids::{
    DisplacerId, FigureId, JointId, ObjectIndex, ObjectIndexAllocator, SegmentId, SiteId,
};
use crate::joint::{Joint, SourceView};
use crate::protocol::{JointChild, NodeRef, ObjectParent, ParentLink, SkeletalNodeRef};
use crate::segment::{DisplacementOrder, Segment};
use crate::site::Site;
use crate::sink::VertexSink;
use crate::skinning::VertexSkinner;
use crate::stats::UpdateStats;
use crate::transform::{matrix_to_array, Trs, TrsField, IDENTITY};
use crate::Result;

/// One row of the matrix palette handed to a renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub index: ObjectIndex,
    pub name: Option<String>,
    /// Column-major world matrix.
    pub matrix: [f32; 16],
}

#[derive(Debug)]
pub struct Humanoid<S: VertexSink = Vec<f32>> {
    cfg: Config,
    figure: FigureId,

    name: Option<String>,
    version: Option<String>,
    info: Vec<String>,
    trs: Trs,
    bbox_center: [f32; 3],
    bbox_size: [f32; 3],
    local_matrix: Matrix4<f32>,

    // Shared skin arrays; counts are in floats and always multiples of 3.
    skin_coords: Vec<f32>,
    num_skin_coords: usize,
    skin_normals: Vec<f32>,
    num_skin_normals: usize,
    source_generation: u64,

    output_coords: S,
    output_normals: S,

    skeleton: Vec<SkeletalNodeRef>,
    root_joint: Option<JointId>,
    joint_list: Vec<JointId>,
    site_list: Vec<SiteId>,
    segment_list: Vec<SegmentId>,
    viewpoints: Vec<String>,

    // Arenas. Nodes are never removed, so a validated handle stays valid.
    pub(crate) joints: Vec<Joint>,
    pub(crate) sites: Vec<Site>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) displacers: Vec<Displacer>,
    joint_names: HashMap<String, JointId>,
    site_names: HashMap<String, SiteId>,

    indices: Arc<ObjectIndexAllocator>,

    matrix_changed: bool,
    skeleton_changed: bool,
    has_child_updates: bool,
    updated_children: Vec<SiteId>,

    skinner: VertexSkinner,
    visit: Vec<JointId>,
    stats: UpdateStats,
}

impl Humanoid<Vec<f32>> {
    /// Figure writing skinned output into flat vectors.
    pub fn new(cfg: Config) -> Self {
        Self::with_outputs(cfg, Vec::new(), Vec::new())
    }
}

impl<S: VertexSink> Humanoid<S> {
    pub fn with_outputs(cfg: Config, output_coords: S, output_normals: S) -> Self {
        let figure = FigureId::next();
        debug!("creating humanoid figure {}", figure.0);
        Self {
            figure,
            name: None,
            version: None,
            info: Vec::new(),
            trs: Trs::default(),
            bbox_center: [0.0; 3],
            bbox_size: [0.0; 3],
            local_matrix: Matrix4::identity(),
            skin_coords: Vec::with_capacity(cfg.vertex_capacity * 3),
            num_skin_coords: 0,
            skin_normals: Vec::with_capacity(cfg.vertex_capacity * 3),
            num_skin_normals: 0,
            source_generation: 0,
            output_coords,
            output_normals,
            skeleton: Vec::with_capacity(cfg.skeleton_capacity),
            root_joint: None,
            joint_list: Vec::with_capacity(cfg.skeleton_capacity),
            site_list: Vec::new(),
            segment_list: Vec::new(),
            viewpoints: Vec::new(),
            joints: Vec::with_capacity(cfg.skeleton_capacity),
            sites: Vec::new(),
            segments: Vec::new(),
            displacers: Vec::new(),
            joint_names: HashMap::new(),
            site_names: HashMap::new(),
            indices: Arc::new(ObjectIndexAllocator::new()),
            matrix_changed: false,
            skeleton_changed: false,
            has_child_updates: false,
            updated_children: Vec::new(),
            skinner: VertexSkinner::new(&cfg),
            visit: Vec::with_capacity(cfg.skeleton_capacity),
            stats: UpdateStats::default(),
            cfg,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn figure(&self) -> FigureId {
        self.figure
    }

    // ---- node creation and lookup -------------------------------------

    pub fn create_joint(&mut self, name: Option<&str>) -> JointId {
        let id = JointId::new(self.figure, self.joints.len());
        if let Some(name) = name {
            self.joint_names.entry(name.to_string()).or_insert(id);
        }
        self.joints.push(Joint::new(name.map(str::to_string)));
        id
    }

    pub fn create_site(&mut self, name: Option<&str>) -> SiteId {
        let id = SiteId::new(self.figure, self.sites.len());
        if let Some(name) = name {
            self.site_names.entry(name.to_string()).or_insert(id);
        }
        self.sites.push(Site::new(name.map(str::to_string)));
        id
    }

    pub fn create_segment(&mut self, name: Option<&str>) -> SegmentId {
        let id = SegmentId::new(self.figure, self.segments.len());
        self.segments.push(Segment::new(name.map(str::to_string)));
        id
    }

    pub fn create_displacer(&mut self, name: Option<&str>) -> DisplacerId {
        let id = DisplacerId::new(self.figure, self.displacers.len());
        self.displacers.push(Displacer::new(name.map(str::to_string)));
        id
    }

    /// First joint created with this name.
    pub fn find_joint(&self, name: &str) -> Option<JointId> {
        self.joint_names.get(name).copied()
    }

    pub fn find_site(&self, name: &str) -> Option<SiteId> {
        self.site_names.get(name).copied()
    }

    pub fn joint(&self, id: JointId) -> Result<&Joint> {
        self.check_node(id.into())?;
        Ok(&self.joints[id.slot()])
    }

    pub fn site(&self, id: SiteId) -> Result<&Site> {
        self.check_node(id.into())?;
        Ok(&self.sites[id.slot()])
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.check_node(id.into())?;
        Ok(&self.segments[id.slot()])
    }

    pub fn displacer(&self, id: DisplacerId) -> Result<&Displacer> {
        self.check_node(id.into())?;
        Ok(&self.displacers[id.slot()])
    }

    /// Resolve a handle against this figure's arenas.
    pub(crate) fn check_node(&self, node: NodeRef) -> Result<()> {
        let (figure, slot, len) = match node {
            NodeRef::Joint(id) => (id.figure(), id.slot(), self.joints.len()),
            NodeRef::Site(id) => (id.figure(), id.slot(), self.sites.len()),
            NodeRef::Segment(id) => (id.figure(), id.slot(), self.segments.len()),
            NodeRef::Displacer(id) => (id.figure(), id.slot(), self.displacers.len()),
        };
        if figure != self.figure {
            return Err(SkeletonError::InconsistentIndex {
                node: node.to_string(),
                reason: format!("handle belongs to figure {}, not {}", figure.0, self.figure.0),
            });
        }
        if slot >= len {
            return Err(SkeletonError::UnknownNode {
                node: node.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn joint_label(&self, id: JointId) -> String {
        match self.joints[id.slot()].name() {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    // ---- root fields --------------------------------------------------

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<&str>) {
        self.name = name.map(str::to_string);
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: Option<&str>) {
        self.version = version.map(str::to_string);
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub fn set_info(&mut self, info: &[String], num_valid: usize) -> Result<()> {
        replace_valid("info", &mut self.info, info, num_valid)
    }

    pub fn trs(&self) -> &Trs {
        &self.trs
    }

    pub fn center(&self) -> [f32; 3] {
        self.trs.center
    }

    pub fn rotation(&self) -> [f32; 4] {
        self.trs.rotation
    }

    pub fn scale(&self) -> [f32; 3] {
        self.trs.scale
    }

    pub fn scale_orientation(&self) -> [f32; 4] {
        self.trs.scale_orientation
    }

    pub fn translation(&self) -> [f32; 3] {
        self.trs.translation
    }

    pub fn set_center(&mut self, val: &[f32]) -> Result<()> {
        self.set_root_trs(TrsField::Center, val)
    }

    pub fn set_rotation(&mut self, val: &[f32]) -> Result<()> {
        self.set_root_trs(TrsField::Rotation, val)
    }

    pub fn set_scale(&mut self, val: &[f32]) -> Result<()> {
        self.set_root_trs(TrsField::Scale, val)
    }

    pub fn set_scale_orientation(&mut self, val: &[f32]) -> Result<()> {
        self.set_root_trs(TrsField::ScaleOrientation, val)
    }

    pub fn set_translation(&mut self, val: &[f32]) -> Result<()> {
        self.set_root_trs(TrsField::Translation, val)
    }

    /// Replace every root transform field at once.
    pub fn set_transform(&mut self, trs: &Trs) {
        self.trs = *trs;
        self.matrix_changed = true;
    }

    fn set_root_trs(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        self.trs.set_field(field, val)?;
        self.matrix_changed = true;
        Ok(())
    }

    pub fn bbox_center(&self) -> [f32; 3] {
        self.bbox_center
    }

    pub fn bbox_size(&self) -> [f32; 3] {
        self.bbox_size
    }

    pub fn set_bbox_center(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_center = vec3_arg("bboxCenter", val)?;
        Ok(())
    }

    pub fn set_bbox_size(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_size = vec3_arg("bboxSize", val)?;
        Ok(())
    }

    /// Root matrix composed from the Humanoid's own transform fields. It is
    /// applied to skeleton-level sites, not folded into the joint hierarchy.
    pub fn local_matrix(&self) -> &Matrix4<f32> {
        &self.local_matrix
    }

    // ---- shared skin arrays ---------------------------------------------

    /// Copy in `num_elements` vertices. The backing array only ever grows.
    ///
    /// Once a skeleton is set the next `update_skeleton` re-skins against the
    /// new data; joint matrices are left as they are.
    pub fn set_skin_coord(&mut self, values: &[f32], num_elements: usize) -> Result<()> {
        let floats = triple_len("skinCoord", num_elements)?;
        if values.len() < floats {
            return Err(SkeletonError::too_short("skinCoord", floats, values.len()));
        }
        copy_into_prefix(&mut self.skin_coords, &values[..floats]);
        self.num_skin_coords = floats;
        self.push_sources();
        Ok(())
    }

    pub fn set_skin_normal(&mut self, values: &[f32], num_elements: usize) -> Result<()> {
        let floats = triple_len("skinNormal", num_elements)?;
        if values.len() < floats {
            return Err(SkeletonError::too_short("skinNormal", floats, values.len()));
        }
        copy_into_prefix(&mut self.skin_normals, &values[..floats]);
        self.num_skin_normals = floats;
        self.push_sources();
        Ok(())
    }

    /// Valid coordinate prefix, three floats per vertex.
    pub fn skin_coord(&self) -> &[f32] {
        &self.skin_coords[..self.num_skin_coords]
    }

    pub fn num_skin_coord(&self) -> usize {
        self.num_skin_coords / 3
    }

    pub fn skin_normal(&self) -> &[f32] {
        &self.skin_normals[..self.num_skin_normals]
    }

    pub fn num_skin_normal(&self) -> usize {
        self.num_skin_normals / 3
    }

    pub fn output_coords(&self) -> &S {
        &self.output_coords
    }

    pub fn output_normals(&self) -> &S {
        &self.output_normals
    }

    /// Current view of the skin arrays as handed to joints.
    pub fn source_view(&self) -> SourceView {
        SourceView {
            num_coords: self.num_skin_coords / 3,
            num_normals: self.num_skin_normals / 3,
            generation: self.source_generation,
        }
    }

    /// Re-point every attached joint at the current skin arrays and queue a
    /// skinning pass so the sinks follow the new vertex count.
    fn push_sources(&mut self) {
        self.source_generation += 1;
        let view = self.source_view();
        for i in 0..self.skeleton.len() {
            if let SkeletalNodeRef::Joint(id) = self.skeleton[i] {
                self.update_sources(id, view);
            }
        }
        if self.root_joint.is_some() {
            self.skeleton_changed = true;
            self.has_child_updates = true;
        }
    }

    fn update_sources(&mut self, id: JointId, view: SourceView) {
        let slot = id.slot();
        self.joints[slot].sources = view;
        for i in 0..self.joints[slot].children.len() {
            if let JointChild::Joint(child) = self.joints[slot].children[i] {
                self.update_sources(child, view);
            }
        }
    }

    // ---- topology -------------------------------------------------------

    pub fn skeleton(&self) -> &[SkeletalNodeRef] {
        &self.skeleton
    }

    pub fn root_joint(&self) -> Option<JointId> {
        self.root_joint
    }

    /// Replace the skeleton with the first `count` entries of `nodes`.
    ///
    /// Only Joints and Sites are accepted; the first Joint becomes the root
    /// joint. Every entry is checked before anything is rewired, so a
    /// rejected call leaves the previous skeleton in place.
    pub fn set_skeleton(&mut self, nodes: &[NodeRef], count: usize) -> Result<()> {
        if nodes.len() < count {
            return Err(SkeletonError::too_short("skeleton", count, nodes.len()));
        }
        let nodes = &nodes[..count];

        let mut seen = HashSet::with_capacity(count);
        for &node in nodes {
            let entry = SkeletalNodeRef::try_from(node)?;
            self.check_node(node)?;
            if !seen.insert(entry) {
                return Err(SkeletonError::InconsistentIndex {
                    node: node.to_string(),
                    reason: "listed twice in the skeleton".into(),
                });
            }
            if let ParentLink::Joint(owner) = self.parent_of(entry) {
                return Err(SkeletonError::InconsistentIndex {
                    node: node.to_string(),
                    reason: format!("already a child of {owner}"),
                });
            }
        }

        for i in 0..self.skeleton.len() {
            match self.skeleton[i] {
                SkeletalNodeRef::Joint(id) => {
                    if !seen.contains(&SkeletalNodeRef::Joint(id)) {
                        warn!("detaching {} from the skeleton", self.joint_label(id));
                    }
                    self.joints[id.slot()].parent = ParentLink::Detached;
                }
                SkeletalNodeRef::Site(id) => self.sites[id.slot()].parent = ParentLink::Detached,
            }
        }

        self.root_joint = None;
        self.skeleton.clear();
        for &node in nodes {
            // Already validated above.
            if let Ok(entry) = SkeletalNodeRef::try_from(node) {
                self.skeleton.push(entry);
            }
        }

        for i in 0..self.skeleton.len() {
            let entry = self.skeleton[i];
            match entry {
                SkeletalNodeRef::Joint(id) => {
                    if self.root_joint.is_none() {
                        self.root_joint = Some(id);
                    }
                    self.attach_joint(id, ParentLink::Humanoid);
                }
                SkeletalNodeRef::Site(id) => self.attach_site(id, ParentLink::Humanoid),
            }
            self.report(entry.into());
        }

        debug!(
            "skeleton set: {} nodes, root joint {:?}",
            self.skeleton.len(),
            self.root_joint.map(|id| self.joint_label(id))
        );
        Ok(())
    }

    fn parent_of(&self, node: SkeletalNodeRef) -> ParentLink {
        match node {
            SkeletalNodeRef::Joint(id) => self.joints[id.slot()].parent,
            SkeletalNodeRef::Site(id) => self.sites[id.slot()].parent,
        }
    }

    /// Wire a joint subtree under `parent`, drawing a fresh object index for
    /// every joint and handing each the current skin view.
    pub(crate) fn attach_joint(&mut self, id: JointId, parent: ParentLink) {
        let view = self.source_view();
        let index = self.request_next_object_index();
        let slot = id.slot();
        {
            let joint = &mut self.joints[slot];
            joint.parent = parent;
            joint.object_index = Some(index);
            joint.sources = view;
            joint.matrix_changed = true;
            joint.update_sent = false;
        }
        trace!("attached {} as object {}", self.joint_label(id), index.0);

        for i in 0..self.joints[slot].children.len() {
            match self.joints[slot].children[i] {
                JointChild::Joint(child) => self.attach_joint(child, ParentLink::Joint(id)),
                JointChild::Site(site) => self.attach_site(site, ParentLink::Joint(id)),
                JointChild::Segment(seg) => self.segments[seg.slot()].parent = Some(id),
            }
        }
    }

    pub(crate) fn attach_site(&mut self, id: SiteId, parent: ParentLink) {
        let site = &mut self.sites[id.slot()];
        site.parent = parent;
        site.matrix_changed = true;
        site.update_sent = false;
    }

    /// Link a joint under a parent joint without touching indices. Used
    /// while the parent is not yet part of a skeleton.
    pub(crate) fn link_joint(&mut self, id: JointId, parent: JointId) {
        let joint = &mut self.joints[id.slot()];
        joint.parent = ParentLink::Joint(parent);
        joint.matrix_changed = true;
        joint.update_sent = false;
    }

    /// Whether a joint's parent chain ends at this Humanoid.
    pub(crate) fn is_attached(&self, id: JointId) -> bool {
        let mut current = id;
        loop {
            match self.joints[current.slot()].parent {
                ParentLink::Humanoid => return true,
                ParentLink::Detached => return false,
                ParentLink::Joint(parent) => current = parent,
            }
        }
    }

    /// Whether `ancestor` sits on the parent chain of `id` (or is `id`).
    pub(crate) fn is_ancestor(&self, ancestor: JointId, id: JointId) -> bool {
        let mut current = id;
        loop {
            if current == ancestor {
                return true;
            }
            match self.joints[current.slot()].parent {
                ParentLink::Joint(parent) => current = parent,
                _ => return false,
            }
        }
    }

    /// Forward a change on `node` towards the root, at most once per frame
    /// per node.
    pub(crate) fn report(&mut self, node: NodeRef) {
        let mut current = node;
        loop {
            let (sent, parent) = match current {
                NodeRef::Joint(id) => {
                    let j = &self.joints[id.slot()];
                    (j.update_sent, j.parent)
                }
                NodeRef::Site(id) => {
                    let s = &self.sites[id.slot()];
                    (s.update_sent, s.parent)
                }
                NodeRef::Segment(_) | NodeRef::Displacer(_) => return,
            };
            if sent || parent == ParentLink::Detached {
                return;
            }
            match current {
                NodeRef::Joint(id) => self.joints[id.slot()].update_sent = true,
                NodeRef::Site(id) => self.sites[id.slot()].update_sent = true,
                _ => {}
            }
            match parent {
                ParentLink::Humanoid => {
                    self.child_update_required(current);
                    return;
                }
                ParentLink::Joint(id) => current = NodeRef::Joint(id),
                ParentLink::Detached => return,
            }
        }
    }

    pub fn joint_list(&self) -> &[JointId] {
        &self.joint_list
    }

    pub fn set_joints(&mut self, joints: &[JointId], num_valid: usize) -> Result<()> {
        for id in joints.iter().take(num_valid) {
            self.check_node((*id).into())?;
        }
        replace_valid("joints", &mut self.joint_list, joints, num_valid)
    }

    pub fn site_list(&self) -> &[SiteId] {
        &self.site_list
    }

    pub fn set_sites(&mut self, sites: &[SiteId], num_valid: usize) -> Result<()> {
        for id in sites.iter().take(num_valid) {
            self.check_node((*id).into())?;
        }
        replace_valid("sites", &mut self.site_list, sites, num_valid)
    }

    pub fn segment_list(&self) -> &[SegmentId] {
        &self.segment_list
    }

    pub fn set_segments(&mut self, segments: &[SegmentId], num_valid: usize) -> Result<()> {
        for id in segments.iter().take(num_valid) {
            self.check_node((*id).into())?;
        }
        replace_valid("segments", &mut self.segment_list, segments, num_valid)
    }

    pub fn viewpoints(&self) -> &[String] {
        &self.viewpoints
    }

    pub fn set_viewpoints(&mut self, viewpoints: &[String], num_valid: usize) -> Result<()> {
        replace_valid("viewpoints", &mut self.viewpoints, viewpoints, num_valid)
    }

    // ---- update -----------------------------------------------------------

    pub fn is_matrix_changed(&self) -> bool {
        self.matrix_changed
    }

    pub fn is_skeleton_changed(&self) -> bool {
        self.skeleton_changed
    }

    pub fn has_child_updates(&self) -> bool {
        self.has_child_updates
    }

    pub fn stats(&self) -> UpdateStats {
        self.stats
    }

    /// Shared allocator, for construction code running on other threads.
    pub fn index_allocator(&self) -> Arc<ObjectIndexAllocator> {
        Arc::clone(&self.indices)
    }

    /// Mark the skeleton dirty so the next update reruns skinning. Displacer
    /// edits do not report themselves; call this after animating them.
    pub fn force_update(&mut self) {
        self.skeleton_changed = true;
        self.has_child_updates = true;
    }

    /// Bring every dirty matrix and the skinned output up to date.
    ///
    /// On error no sink is written and every dirty flag stays set, so the
    /// next call after fixing the input recomputes fully.
    pub fn update_skeleton(&mut self) -> Result<()> {
        if !self.has_child_updates && !self.matrix_changed {
            return Ok(());
        }

        let skin_root = match self.root_joint {
            Some(root) if self.matrix_changed || self.skeleton_changed => Some(root),
            _ => None,
        };
        if let Some(root) = skin_root {
            if let Err(err) = self.validate_pass(root) {
                warn!(
                    "skeleton update failed ({}): {err}; dirty flags kept",
                    err.category()
                );
                return Err(err);
            }
        }

        self.stats.passes += 1;
        debug!(
            "update: matrix_changed={} skeleton_changed={} queued_sites={}",
            self.matrix_changed,
            self.skeleton_changed,
            self.updated_children.len()
        );

        if self.matrix_changed {
            self.local_matrix = self.trs.compose();
            self.stats.root_recomposes += 1;
        }

        if let Some(root) = skin_root {
            self.run_pass(root);
        }
        self.skeleton_changed = false;

        let root_matrix = self.local_matrix;
        if self.matrix_changed {
            for node in &self.skeleton {
                if let SkeletalNodeRef::Site(id) = *node {
                    self.sites[id.slot()].update_location(&root_matrix, true, &mut self.stats);
                }
            }
        } else {
            for id in &self.updated_children {
                let site = &mut self.sites[id.slot()];
                if site.parent == ParentLink::Humanoid {
                    site.update_location(&root_matrix, false, &mut self.stats);
                }
            }
        }

        self.updated_children.clear();
        self.has_child_updates = false;
        self.matrix_changed = false;
        Ok(())
    }

    /// Check every index the pass will touch and record the joints reachable
    /// from `root` in `visit`.
    fn validate_pass(&mut self, root: JointId) -> Result<()> {
        self.visit.clear();
        self.visit.push(root);
        let mut next = 0;
        while next < self.visit.len() {
            let id = self.visit[next];
            next += 1;
            self.validate_joint(id)?;
            let joint = &self.joints[id.slot()];
            for child in &joint.children {
                if let JointChild::Joint(child) = *child {
                    self.visit.push(child);
                }
            }
        }
        Ok(())
    }

    fn validate_joint(&self, id: JointId) -> Result<()> {
        let joint = &self.joints[id.slot()];
        let view = joint.sources;
        if view.generation != self.source_generation {
            return Err(SkeletonError::InconsistentIndex {
                node: id.to_string(),
                reason: format!(
                    "skin view generation {} is stale (current {})",
                    view.generation, self.source_generation
                ),
            });
        }
        let available = view.num_coords;
        let out_of_range = |index: usize| SkeletonError::SkinIndexOutOfRange {
            joint: self.joint_label(id),
            index,
            available,
        };

        for &idx in joint.skin_coord_index() {
            if idx as usize >= available {
                return Err(out_of_range(idx as usize));
            }
        }
        for d in &joint.displacers {
            for &idx in self.displacers[d.slot()].coord_index() {
                if idx as usize >= available {
                    return Err(out_of_range(idx as usize));
                }
            }
        }
        for child in &joint.children {
            let JointChild::Segment(seg_id) = *child else {
                continue;
            };
            let seg = &self.segments[seg_id.slot()];
            let range = seg.coord_range();
            for d in &seg.displacers {
                for &idx in self.displacers[d.slot()].coord_index() {
                    let idx = idx as usize;
                    if !range.contains(&idx) {
                        return Err(SkeletonError::InconsistentIndex {
                            node: NodeRef::Displacer(*d).to_string(),
                            reason: format!(
                                "vertex {idx} lies outside {seg_id} range {range:?}"
                            ),
                        });
                    }
                    if idx >= available {
                        return Err(out_of_range(idx));
                    }
                }
            }
        }
        Ok(())
    }

    /// Recompute the joint hierarchy under `root` and skin into the sinks.
    /// Indices were checked by [`Self::validate_pass`].
    fn run_pass(&mut self, root: JointId) {
        self.skinner.begin_pass(
            &self.skin_coords[..self.num_skin_coords],
            &self.skin_normals[..self.num_skin_normals],
        );

        for id in &self.visit {
            let joint = &self.joints[id.slot()];
            for d in &joint.displacers {
                self.skinner.displace_rest(&self.displacers[d.slot()]);
            }
            for seg in joint_segments(&self.segments, joint, DisplacementOrder::BeforeTransform) {
                for d in &seg.displacers {
                    self.skinner.displace_rest(&self.displacers[d.slot()]);
                }
            }
        }

        self.update_joint(root, &IDENTITY, false);
        self.skinner.finish(&self.cfg);

        for id in &self.visit {
            let joint = &self.joints[id.slot()];
            for seg in joint_segments(&self.segments, joint, DisplacementOrder::AfterTransform) {
                for d in &seg.displacers {
                    self.skinner.displace_output(&self.displacers[d.slot()]);
                }
            }
        }

        self.skinner
            .flush(&mut self.output_coords, &mut self.output_normals);
    }

    fn update_joint(&mut self, id: JointId, parent_world: &Matrix4<f32>, parent_changed: bool) {
        let slot = id.slot();
        let changed = self.joints[slot].refresh(parent_world, parent_changed, &mut self.stats);
        let world = self.joints[slot].world_matrix;
        trace!("joint {} changed={changed}", self.joint_label(id));

        let joint = &self.joints[slot];
        let written = self
            .skinner
            .skin_joint(&world, &joint.skin_coord_index, joint.skin_coord_weight());
        self.stats.skinned_vertices += written as u64;

        for i in 0..self.joints[slot].children.len() {
            match self.joints[slot].children[i] {
                JointChild::Joint(child) => self.update_joint(child, &world, changed),
                JointChild::Site(site) => {
                    self.sites[site.slot()].update_location(&world, changed, &mut self.stats);
                }
                JointChild::Segment(_) => {}
            }
        }
    }

    /// World matrices of every attached joint, ordered by object index.
    pub fn matrix_palette(&self) -> Vec<PaletteEntry> {
        let mut out = Vec::with_capacity(self.joints.len());
        let mut stack: Vec<JointId> = self
            .skeleton
            .iter()
            .filter_map(|node| match *node {
                SkeletalNodeRef::Joint(id) => Some(id),
                SkeletalNodeRef::Site(_) => None,
            })
            .collect();

        while let Some(id) = stack.pop() {
            let joint = &self.joints[id.slot()];
            if let Some(index) = joint.object_index {
                out.push(PaletteEntry {
                    index,
                    name: joint.name.clone(),
                    matrix: matrix_to_array(&joint.world_matrix),
                });
            }
            stack.extend(joint.children.iter().filter_map(|child| match *child {
                JointChild::Joint(child) => Some(child),
                _ => None,
            }));
        }

        out.sort_by_key(|entry| entry.index);
        out
    }
}

impl<S: VertexSink> ObjectParent for Humanoid<S> {
    fn child_update_required(&mut self, child: NodeRef) {
        match child {
            NodeRef::Joint(id) if Some(id) == self.root_joint => self.skeleton_changed = true,
            NodeRef::Site(id) => {
                if !self.updated_children.contains(&id) {
                    self.updated_children.push(id);
                }
            }
            other => trace!("no update path for skeleton node {other}"),
        }
        self.has_child_updates = true;
    }

    fn request_next_object_index(&self) -> ObjectIndex {
        self.indices.next_index()
    }
}

/// Segments under `joint` whose displacers run at `order`.
fn joint_segments<'a>(
    segments: &'a [Segment],
    joint: &'a Joint,
    order: DisplacementOrder,
) -> impl Iterator<Item = &'a Segment> + 'a {
    joint.children.iter().filter_map(move |child| match *child {
        JointChild::Segment(id) => {
            let seg = &segments[id.slot()];
            (seg.displacement_order == order).then_some(seg)
        }
        _ => None,
    })
}

/// Overwrite the front of `dst` with `src`, growing but never shrinking it.
fn copy_into_prefix(dst: &mut Vec<f32>, src: &[f32]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0.0);
    }
    dst[..src.len()].copy_from_slice(src);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure() -> Humanoid {
        Humanoid::new(Config::default())
    }

    #[test]
    fn first_joint_becomes_root() {
        let mut fig = figure();
        let s1 = fig.create_site(None);
        let a = fig.create_joint(Some("a"));
        let s2 = fig.create_site(None);
        let b = fig.create_joint(Some("b"));

        let nodes = [
            NodeRef::Site(s1),
            NodeRef::Joint(a),
            NodeRef::Site(s2),
            NodeRef::Joint(b),
        ];
        fig.set_skeleton(&nodes, 4).unwrap();
        assert_eq!(fig.root_joint(), Some(a));
        assert_eq!(fig.skeleton().len(), 4);
        assert_eq!(fig.joint(b).unwrap().parent(), ParentLink::Humanoid);
    }

    #[test]
    fn rejected_skeleton_keeps_previous_state() {
        let mut fig = figure();
        let a = fig.create_joint(None);
        fig.set_skeleton(&[NodeRef::Joint(a)], 1).unwrap();

        let b = fig.create_joint(None);
        let seg = fig.create_segment(None);
        let err = fig
            .set_skeleton(&[NodeRef::Joint(b), NodeRef::Segment(seg)], 2)
            .unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidChildType { .. }));
        assert_eq!(fig.root_joint(), Some(a));
        assert_eq!(fig.skeleton(), &[SkeletalNodeRef::Joint(a)]);
        assert_eq!(fig.joint(b).unwrap().parent(), ParentLink::Detached);
    }

    #[test]
    fn skeleton_count_drops_the_tail() {
        let mut fig = figure();
        let a = fig.create_joint(None);
        let b = fig.create_joint(None);
        fig.set_skeleton(&[NodeRef::Joint(a), NodeRef::Joint(b)], 2).unwrap();
        fig.set_skeleton(&[NodeRef::Joint(b), NodeRef::Joint(a)], 1).unwrap();
        assert_eq!(fig.skeleton(), &[SkeletalNodeRef::Joint(b)]);
        assert_eq!(fig.joint(a).unwrap().parent(), ParentLink::Detached);
        assert!(fig.set_skeleton(&[NodeRef::Joint(a)], 2).is_err());
    }

    #[test]
    fn foreign_handles_are_inconsistent() {
        let mut other = figure();
        let foreign = other.create_joint(None);
        let mut fig = figure();
        let err = fig.set_skeleton(&[NodeRef::Joint(foreign)], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::InconsistentIndex { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn attach_draws_increasing_indices() {
        let mut fig = figure();
        let a = fig.create_joint(None);
        let b = fig.create_joint(None);
        fig.set_skeleton(&[NodeRef::Joint(a), NodeRef::Joint(b)], 2).unwrap();
        assert_eq!(fig.joint(a).unwrap().object_index(), Some(ObjectIndex(0)));
        assert_eq!(fig.joint(b).unwrap().object_index(), Some(ObjectIndex(1)));

        // Re-attaching never reuses a slot.
        fig.set_skeleton(&[NodeRef::Joint(a)], 1).unwrap();
        assert_eq!(fig.joint(a).unwrap().object_index(), Some(ObjectIndex(2)));
        assert_eq!(fig.request_next_object_index(), ObjectIndex(3));
    }

    #[test]
    fn skin_coord_shrink_keeps_only_valid_prefix() {
        let mut fig = figure();
        let five: Vec<f32> = (0..15).map(|v| v as f32).collect();
        fig.set_skin_coord(&five, 5).unwrap();
        fig.set_skin_coord(&[9.0; 6], 2).unwrap();
        assert_eq!(fig.num_skin_coord(), 2);
        assert_eq!(fig.skin_coord(), &[9.0; 6]);
        assert!(fig.set_skin_coord(&[1.0; 5], 2).is_err());
        assert_eq!(fig.num_skin_coord(), 2);
    }

    #[test]
    fn skin_update_repoints_attached_joints() {
        let mut fig = figure();
        let root = fig.create_joint(None);
        fig.set_skeleton(&[NodeRef::Joint(root)], 1).unwrap();
        fig.set_skin_coord(&[0.0; 12], 4).unwrap();
        fig.set_skin_normal(&[0.0; 6], 2).unwrap();

        let view = fig.joint(root).unwrap().source_view();
        assert_eq!(view.num_coords, 4);
        assert_eq!(view.num_normals, 2);
        assert_eq!(view, fig.source_view());
    }

    #[test]
    fn root_trs_sets_only_matrix_flag() {
        let mut fig = figure();
        fig.set_translation(&[1.0, 2.0, 3.0]).unwrap();
        assert!(fig.is_matrix_changed());
        assert!(!fig.is_skeleton_changed());
        fig.update_skeleton().unwrap();
        assert!(!fig.is_matrix_changed());
        assert_eq!(fig.stats().root_recomposes, 1);

        fig.set_bbox_size(&[1.0, 1.0, 1.0]).unwrap();
        assert!(!fig.is_matrix_changed());
    }

    #[test]
    fn queued_sites_are_deduplicated() {
        let mut fig = figure();
        let s = fig.create_site(None);
        fig.child_update_required(NodeRef::Site(s));
        fig.child_update_required(NodeRef::Site(s));
        assert_eq!(fig.updated_children.len(), 1);
        assert!(fig.has_child_updates());
    }

    #[test]
    fn auxiliary_lists_drop_the_tail() {
        let mut fig = figure();
        let joints: Vec<JointId> = (0..3).map(|_| fig.create_joint(None)).collect();
        let sites: Vec<SiteId> = (0..3).map(|_| fig.create_site(None)).collect();
        let segments: Vec<SegmentId> = (0..3).map(|_| fig.create_segment(None)).collect();

        fig.set_joints(&joints, 3).unwrap();
        fig.set_sites(&sites, 3).unwrap();
        fig.set_segments(&segments, 3).unwrap();
        assert_eq!(fig.joint_list(), joints.as_slice());

        fig.set_joints(&joints, 1).unwrap();
        fig.set_sites(&sites, 1).unwrap();
        fig.set_segments(&segments, 1).unwrap();
        assert_eq!(fig.joint_list(), &joints[..1]);
        assert_eq!(fig.site_list(), &sites[..1]);
        assert_eq!(fig.segment_list(), &segments[..1]);
    }

    #[test]
    fn auxiliary_lists_reject_short_input_unchanged() {
        let mut fig = figure();
        let joints: Vec<JointId> = (0..2).map(|_| fig.create_joint(None)).collect();
        let sites: Vec<SiteId> = (0..2).map(|_| fig.create_site(None)).collect();
        let segments: Vec<SegmentId> = (0..2).map(|_| fig.create_segment(None)).collect();
        fig.set_joints(&joints, 2).unwrap();
        fig.set_sites(&sites, 2).unwrap();
        fig.set_segments(&segments, 2).unwrap();

        let err = fig.set_joints(&joints[..1], 2).unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidArgument { .. }));
        let err = fig.set_sites(&sites[..1], 2).unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidArgument { .. }));
        let err = fig.set_segments(&segments[..1], 2).unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidArgument { .. }));

        assert_eq!(fig.joint_list(), joints.as_slice());
        assert_eq!(fig.site_list(), sites.as_slice());
        assert_eq!(fig.segment_list(), segments.as_slice());
    }

    #[test]
    fn auxiliary_lists_reject_foreign_and_unknown_handles() {
        let mut other = figure();
        let foreign_joint = other.create_joint(None);
        let foreign_site = other.create_site(None);
        let foreign_segment = other.create_segment(None);

        let mut fig = figure();
        let own = fig.create_joint(None);
        fig.set_joints(&[own], 1).unwrap();

        let err = fig.set_joints(&[own, foreign_joint], 2).unwrap_err();
        assert!(matches!(err, SkeletonError::InconsistentIndex { .. }));
        let err = fig.set_sites(&[foreign_site], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::InconsistentIndex { .. }));
        let err = fig.set_segments(&[foreign_segment], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::InconsistentIndex { .. }));
        assert_eq!(fig.joint_list(), &[own]);

        let missing_joint = JointId::new(fig.figure(), 7);
        let missing_site = SiteId::new(fig.figure(), 0);
        let missing_segment = SegmentId::new(fig.figure(), 3);
        let err = fig.set_joints(&[missing_joint], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::UnknownNode { .. }));
        let err = fig.set_sites(&[missing_site], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::UnknownNode { .. }));
        let err = fig.set_segments(&[missing_segment], 1).unwrap_err();
        assert!(matches!(err, SkeletonError::UnknownNode { .. }));
        assert!(fig.site_list().is_empty());
        assert!(fig.segment_list().is_empty());
    }

    #[test]
    fn skin_arrays_before_the_skeleton_leave_the_figure_clean() {
        let mut fig = figure();
        fig.set_skin_coord(&[0.0; 3], 1).unwrap();
        assert!(!fig.is_skeleton_changed());
        assert!(!fig.has_child_updates());
    }

    #[test]
    fn info_and_viewpoints_use_valid_counts() {
        let mut fig = figure();
        let names: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        fig.set_info(&names, 3).unwrap();
        fig.set_info(&names, 1).unwrap();
        assert_eq!(fig.info(), &["a".to_string()]);
        fig.set_viewpoints(&names, 2).unwrap();
        assert_eq!(fig.viewpoints().len(), 2);
        assert!(fig.set_viewpoints(&names, 4).is_err());
        assert_eq!(fig.viewpoints().len(), 2);
    }
}
