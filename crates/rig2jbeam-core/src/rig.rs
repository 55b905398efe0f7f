//! Intermediate representation of a parsed rig document
//!
//! A [`Rig`] owns every entity of one input file. Parsers feed it
//! [`Record`]s, the resolvers add derived data (resolved mesh names, group
//! tags, masses) in place, and the emitter reads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Node identifier, normalized so `5` and `node5` compare equal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Normalize a raw id field: purely numeric ids become `node<N>`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<u32>() {
                return Self::numeric(n);
            }
        }
        Self(raw.to_string())
    }

    pub fn numeric(n: u32) -> Self {
        Self(format!("node{}", n))
    }

    /// The numeric id if this node was declared with one
    pub fn number(&self) -> Option<u32> {
        let digits = self.0.strip_prefix("node")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-letter options understood by a record type
pub trait FlagLetter: Sized + Ord + Copy {
    fn from_letter(letter: char) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeFlag {
    Normal,
    LoadBearing,
    NoSparks,
    ExhaustSource,
    ExhaustDirection,
    NoGroundContact,
    Hook,
    TerrainEdit,
    ExtraBuoyancy,
    NoParticles,
    Log,
    NoMouseGrab,
}

impl FlagLetter for NodeFlag {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'n' => NodeFlag::Normal,
            'l' => NodeFlag::LoadBearing,
            'f' => NodeFlag::NoSparks,
            'x' => NodeFlag::ExhaustSource,
            'y' => NodeFlag::ExhaustDirection,
            'c' => NodeFlag::NoGroundContact,
            'h' => NodeFlag::Hook,
            'e' => NodeFlag::TerrainEdit,
            'b' => NodeFlag::ExtraBuoyancy,
            'p' => NodeFlag::NoParticles,
            'L' => NodeFlag::Log,
            'm' => NodeFlag::NoMouseGrab,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BeamFlag {
    Normal,
    Invisible,
    Rope,
    Support,
}

impl FlagLetter for BeamFlag {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'n' => BeamFlag::Normal,
            'i' => BeamFlag::Invisible,
            'r' => BeamFlag::Rope,
            's' => BeamFlag::Support,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShockFlag {
    Normal,
    Invisible,
    ActiveLeft,
    ActiveRight,
    Metric,
}

impl FlagLetter for ShockFlag {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'n' => ShockFlag::Normal,
            'i' => ShockFlag::Invisible,
            'L' => ShockFlag::ActiveLeft,
            'R' => ShockFlag::ActiveRight,
            'm' => ShockFlag::Metric,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HydroFlag {
    Normal,
    Invisible,
    NoSpeedCoupling,
    Aileron,
    Rudder,
    Elevator,
    AileronElevator,
    InvAileronElevator,
    AileronRudder,
    InvAileronRudder,
    ElevatorRudder,
    InvElevatorRudder,
}

impl FlagLetter for HydroFlag {
    fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'n' => HydroFlag::Normal,
            'i' => HydroFlag::Invisible,
            's' => HydroFlag::NoSpeedCoupling,
            'a' => HydroFlag::Aileron,
            'r' => HydroFlag::Rudder,
            'e' => HydroFlag::Elevator,
            'u' => HydroFlag::AileronElevator,
            'v' => HydroFlag::InvAileronElevator,
            'x' => HydroFlag::AileronRudder,
            'y' => HydroFlag::InvAileronRudder,
            'g' => HydroFlag::ElevatorRudder,
            'h' => HydroFlag::InvElevatorRudder,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: [f64; 3],
    pub flags: BTreeSet<NodeFlag>,
    pub friction: f64,
    /// Explicit load mass for load-bearing nodes
    pub mass_override: Option<f64>,
    /// Filled in by the mass calculator
    pub mass: f64,
    pub fixed: bool,
    /// Group tags in first-assigned order, no duplicates
    pub groups: Vec<String>,
    pub line: usize,
}

impl Node {
    pub fn has(&self, flag: NodeFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Append a group tag unless the node already carries it
    pub fn add_group(&mut self, tag: &str) -> bool {
        if self.groups.iter().any(|g| g == tag) {
            return false;
        }
        self.groups.push(tag.to_string());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeamType {
    Normal,
    Support,
    Rope,
    /// Shock absorbers with length bounds
    Bounded,
}

impl BeamType {
    pub fn jbeam_name(self) -> &'static str {
        match self {
            BeamType::Normal => "NORMAL",
            BeamType::Support => "SUPPORT",
            BeamType::Rope | BeamType::Bounded => "BOUNDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub nodes: [NodeId; 2],
    pub spring: f64,
    pub damp: f64,
    pub deform: f64,
    pub strength: f64,
    pub kind: BeamType,
    pub invisible: bool,
    pub short_bound: Option<f64>,
    pub long_bound: Option<f64>,
    pub precompression: Option<f64>,
    /// Detacher group in effect when the beam was parsed, 0 for none
    pub break_group: u32,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hydro {
    pub nodes: [NodeId; 2],
    pub factor: f64,
    pub flags: BTreeSet<HydroFlag>,
    pub spring: f64,
    pub damp: f64,
    pub deform: f64,
    pub strength: f64,
    pub line: usize,
}

/// Which wheel section a wheel came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelKind {
    /// `wheels`
    Basic,
    /// `wheels2`
    Advanced,
    /// `meshwheels`, `meshwheels2`
    Mesh,
    /// `flexbodywheels`
    Flexbody,
}

impl WheelKind {
    /// Whether the target builds a separate tyre around the hub
    pub fn has_tire(self) -> bool {
        matches!(self, WheelKind::Advanced | WheelKind::Flexbody)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelSide {
    Left,
    Right,
}

/// A rotating assembly shared by every wheel section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wheel {
    pub kind: WheelKind,
    /// Outer (tyre) radius
    pub radius: f64,
    /// Rim/hub radius for sections that have one
    pub rim_radius: Option<f64>,
    pub width: f64,
    pub rays: u32,
    pub node1: NodeId,
    pub node2: NodeId,
    /// `None` when the source wrote 9999
    pub rigidity_node: Option<NodeId>,
    pub braking: u8,
    pub propulsion: u8,
    pub arm: NodeId,
    pub mass: f64,
    /// Tyre spring/damp (or the only pair for single-pair sections)
    pub spring: f64,
    pub damp: f64,
    /// Rim spring/damp for two-pair sections
    pub rim_spring: Option<f64>,
    pub rim_damp: Option<f64>,
    pub side: Option<WheelSide>,
    pub rim_mesh: Option<String>,
    pub tyre_mesh: Option<String>,
    pub line: usize,
}

impl Wheel {
    pub fn node_refs(&self) -> impl Iterator<Item = &NodeId> {
        [&self.node1, &self.node2, &self.arm]
            .into_iter()
            .chain(self.rigidity_node.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentKind {
    Flexbody,
    Prop,
}

impl AttachmentKind {
    pub fn group_suffix(self) -> &'static str {
        match self {
            AttachmentKind::Flexbody => "_flexbody",
            AttachmentKind::Prop => "_prop",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttachmentKind::Flexbody => "flexbody",
            AttachmentKind::Prop => "prop",
        }
    }
}

/// One entry of a `forset` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForsetEntry {
    Named(NodeId),
    /// Inclusive numeric range; a single id is `start == end`
    Range { start: u32, end: u32 },
}

impl ForsetEntry {
    /// Number of node ids this entry names
    pub fn count(&self) -> usize {
        match self {
            ForsetEntry::Named(_) => 1,
            ForsetEntry::Range { start, end } => (end - start) as usize + 1,
        }
    }

    /// Resolve against the nodes of `rig`
    ///
    /// Numbers are positions in the node list, so they work for named nodes
    /// too. Returns the resolved ids and how many entries named no node.
    pub fn resolve(&self, rig: &Rig) -> (Vec<NodeId>, usize) {
        match self {
            ForsetEntry::Named(id) if rig.has_node(id) => (vec![id.clone()], 0),
            ForsetEntry::Named(_) => (Vec::new(), 1),
            ForsetEntry::Range { start, end } => {
                let ids: Vec<NodeId> = (*start..=*end)
                    .filter_map(|i| rig.nodes.get(i as usize))
                    .map(|node| node.id.clone())
                    .collect();
                let missing = self.count() - ids.len();
                (ids, missing)
            }
        }
    }
}

impl fmt::Display for ForsetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForsetEntry::Named(id) => write!(f, "{}", id),
            ForsetEntry::Range { start, end } if start == end => write!(f, "{}", start),
            ForsetEntry::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationMode {
    Rotation,
    Translation,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropAnimation {
    pub factor: f64,
    pub mode: AnimationMode,
}

/// Flexbody or prop: a mesh attached to three frame nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAttachment {
    pub kind: AttachmentKind,
    pub reference: NodeId,
    pub x_node: NodeId,
    pub y_node: NodeId,
    pub offset: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
    /// Mesh name as written in the rig
    pub mesh: String,
    /// Mesh name after duplicate resolution
    pub resolved_mesh: String,
    pub forset: Vec<ForsetEntry>,
    /// `forset` expanded once at parse time, in first-listed order
    pub forset_nodes: Vec<NodeId>,
    pub non_flex_materials: Vec<String>,
    pub animation: Option<PropAnimation>,
    /// Derived by the node-group resolver
    pub group: Option<String>,
    /// Every node that carries `group`
    pub members: Vec<NodeId>,
    pub line: usize,
}

impl VisualAttachment {
    pub fn frame_nodes(&self) -> [&NodeId; 3] {
        [&self.reference, &self.x_node, &self.y_node]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Collision,
    Visual,
    Both,
}

impl SurfaceKind {
    pub fn is_collision(self) -> bool {
        matches!(self, SurfaceKind::Collision | SurfaceKind::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub nodes: [NodeId; 3],
    pub kind: SurfaceKind,
    pub material: String,
    pub drag: f64,
    pub lift: f64,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub nodes: [NodeId; 4],
    pub kind: SurfaceKind,
    pub material: String,
    pub drag: f64,
    pub lift: f64,
    pub line: usize,
}

impl Quad {
    /// Split along the diagonal between the first and third node
    pub fn split(&self) -> [Triangle; 2] {
        let [a, b, c, d] = self.nodes.clone();
        let tri = |nodes: [NodeId; 3]| Triangle {
            nodes,
            kind: self.kind,
            material: self.material.clone(),
            drag: self.drag,
            lift: self.lift,
            line: self.line,
        };
        [tri([a.clone(), b, c.clone()]), tri([a, c, d])]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    pub shift_down_rpm: f64,
    pub shift_up_rpm: f64,
    pub torque: f64,
    pub differential: f64,
    /// Reverse, neutral, then forward ratios as written
    pub gears: Vec<f64>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngOption {
    pub inertia: f64,
    pub engine_type: String,
    pub clutch_force: Option<f64>,
    pub shift_time: Option<f64>,
    pub clutch_time: Option<f64>,
    pub post_shift_time: Option<f64>,
    pub stall_rpm: Option<f64>,
    pub idle_rpm: Option<f64>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TorqueCurve {
    Named(String),
    /// `(rpm, fraction of peak torque)`
    Points(Vec<(f64, f64)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brakes {
    pub force: f64,
    pub parking_force: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefNodes {
    pub center: NodeId,
    pub back: NodeId,
    pub left: NodeId,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalCamera {
    pub position: [f64; 3],
    pub nodes: Vec<NodeId>,
    pub spring: f64,
    pub damp: f64,
    pub fov: f64,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferentialMode {
    Open,
    Locked,
    Split,
    Viscous,
}

impl DifferentialMode {
    pub fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'o' => DifferentialMode::Open,
            'l' => DifferentialMode::Locked,
            's' => DifferentialMode::Split,
            'v' => DifferentialMode::Viscous,
            _ => return None,
        })
    }

    pub fn jbeam_name(self) -> &'static str {
        match self {
            DifferentialMode::Open => "open",
            DifferentialMode::Locked => "locked",
            DifferentialMode::Split => "split",
            DifferentialMode::Viscous => "viscous",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axle {
    pub wheel1: [NodeId; 2],
    pub wheel2: [NodeId; 2],
    pub modes: Vec<DifferentialMode>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rail {
    pub name: String,
    pub nodes: Vec<NodeId>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slidenode {
    pub node: NodeId,
    pub rail: String,
    pub spring: f64,
    pub strength: f64,
    pub tolerance: f64,
    pub line: usize,
}

/// One parsed line, tagged by the section it came from
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Globals {
        dry_weight: f64,
        load_weight: f64,
        material: Option<String>,
    },
    Node(Node),
    Beam(Beam),
    Hydro(Hydro),
    Fix(NodeId),
    Wheel(Wheel),
    Attachment(VisualAttachment),
    Forset(Vec<ForsetEntry>),
    Triangle(Triangle),
    Quad(Quad),
    Engine(Engine),
    EngOption(EngOption),
    TorqueCurve(TorqueCurve),
    Brakes(Brakes),
    RefNodes(RefNodes),
    Camera(InternalCamera),
    Axle(Axle),
    Rail(Rail),
    Slidenode {
        slidenode: Slidenode,
        anonymous_rail: Option<Rail>,
    },
    MinimumMass(f64),
}

/// The whole document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rig {
    pub name: String,
    pub authors: Vec<String>,
    pub dry_weight: Option<f64>,
    pub load_weight: Option<f64>,
    pub minimum_mass: Option<f64>,
    pub rollon: bool,
    pub nodes: Vec<Node>,
    pub beams: Vec<Beam>,
    pub hydros: Vec<Hydro>,
    pub wheels: Vec<Wheel>,
    pub attachments: Vec<VisualAttachment>,
    pub triangles: Vec<Triangle>,
    pub quads: Vec<Quad>,
    pub engine: Option<Engine>,
    pub engoption: Option<EngOption>,
    pub torque_curve: Option<TorqueCurve>,
    pub brakes: Option<Brakes>,
    pub ref_nodes: Option<RefNodes>,
    pub cameras: Vec<InternalCamera>,
    pub axles: Vec<Axle>,
    pub rails: Vec<Rail>,
    pub slidenodes: Vec<Slidenode>,
    #[serde(skip)]
    node_index: HashMap<NodeId, usize>,
}

impl Rig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a node; returns false (and keeps the first) when the id is taken
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.node_index.contains_key(&node.id) {
            return false;
        }
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    /// Position of a node in `nodes`
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        match self.node_index.get(id) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    pub fn flexbodies(&self) -> impl Iterator<Item = &VisualAttachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Flexbody)
    }

    pub fn props(&self) -> impl Iterator<Item = &VisualAttachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Prop)
    }

    /// Distance between two nodes, if both exist
    pub fn node_distance(&self, a: &NodeId, b: &NodeId) -> Option<f64> {
        let pa = self.node(a)?.position;
        let pb = self.node(b)?.position;
        let d: f64 = (0..3).map(|i| (pa[i] - pb[i]).powi(2)).sum();
        Some(d.sqrt())
    }

    /// Rebuild the id index after deserializing
    pub fn reindex(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
    }
}
