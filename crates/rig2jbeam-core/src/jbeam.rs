//! JBeam document emission
//!
//! Tables are arrays whose first row is a header. Option objects such as
//! `{"beamSpring": 9000000}` apply to every following row, so they are only
//! written when the value differs from the one in effect.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::names::mesh_stem;
use crate::report::ConversionReport;
use crate::rig::{
    AnimationMode, AttachmentKind, DifferentialMode, NodeFlag, NodeId, Rig, TorqueCurve,
    VisualAttachment, Wheel, WheelKind,
};
use crate::settings::ConversionSettings;
use crate::transform::CoordinateTransform;

/// `(rpm, fraction of peak torque)` used when no curve is given
pub const DEFAULT_TORQUE_CURVE: &[(f64, f64)] = &[
    (0.0, 0.0),
    (500.0, 0.6),
    (1000.0, 0.75),
    (1500.0, 0.85),
    (2000.0, 0.95),
    (2500.0, 1.0),
    (3000.0, 1.0),
    (3500.0, 0.97),
    (4000.0, 0.9),
    (4500.0, 0.8),
    (5000.0, 0.7),
];

/// Strength written for unbreakable slidenodes
const UNBREAKABLE_STRENGTH: f64 = 100_000_000.0;
const SLIDENODE_CAP_STRENGTH: f64 = 345_435.0;
const DEFAULT_IDLE_RPM: f64 = 800.0;
const DEFAULT_INERTIA: f64 = 10.0;
const CAMERA_NODE_WEIGHT: f64 = 20.0;

/// One JBeam table with change-only option tracking
struct Table {
    rows: Vec<Value>,
    current: HashMap<&'static str, Value>,
}

impl Table {
    fn new(header: &[&str]) -> Self {
        Self {
            rows: vec![json!(header)],
            current: HashMap::new(),
        }
    }

    /// Treat `value` as already in effect without writing it
    fn assume(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.current.insert(key, value.into());
        self
    }

    fn set(&mut self, key: &'static str, value: impl Into<Value>) {
        let value = value.into();
        if self.current.get(key) == Some(&value) {
            return;
        }
        self.rows.push(json!({ key: value.clone() }));
        self.current.insert(key, value);
    }

    /// Emit an option object unconditionally
    fn note(&mut self, value: Value) {
        self.rows.push(value);
    }

    fn row(&mut self, row: Vec<Value>) {
        self.rows.push(Value::Array(row));
    }

    fn into_value(self) -> Value {
        Value::Array(self.rows)
    }
}

fn xyz([x, y, z]: [f64; 3]) -> Value {
    json!({ "x": x, "y": y, "z": z })
}

fn id(node: &NodeId) -> Value {
    Value::String(node.as_str().to_string())
}

/// Part name derived from the rig title: lowercase word characters only
pub fn part_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        let c = if c.is_alphanumeric() { c } else { '_' };
        if !(c == '_' && name.ends_with('_')) {
            name.push(c);
        }
    }
    let name = name.trim_matches('_');
    if name.is_empty() {
        "vehicle".to_string()
    } else {
        name.to_string()
    }
}

/// Serializes a resolved [`Rig`] into a JBeam JSON tree
pub struct JBeamEmitter<'a> {
    rig: &'a Rig,
    settings: &'a ConversionSettings,
    transform: CoordinateTransform,
}

impl<'a> JBeamEmitter<'a> {
    pub fn new(rig: &'a Rig, settings: &'a ConversionSettings) -> Self {
        Self {
            rig,
            settings,
            transform: settings.transform,
        }
    }

    pub fn emit(&self, report: &mut ConversionReport) -> Value {
        let rig = self.rig;
        let mut part = Map::new();

        let authors = if rig.authors.is_empty() {
            self.settings.default_author.clone()
        } else {
            rig.authors.join(", ")
        };
        part.insert(
            "information".into(),
            json!({ "name": rig.name, "authors": authors }),
        );
        part.insert("slotType".into(), json!(self.settings.slot_type));

        if let Some(refs) = &rig.ref_nodes {
            let mut table = Table::new(&["ref:", "back:", "left:", "up:"]);
            table.row(vec![id(&refs.center), id(&refs.back), id(&refs.left), id(&refs.center)]);
            part.insert("refNodes".into(), table.into_value());
        }

        if rig.engine.is_some() {
            part.insert("enginetorque".into(), self.engine_torque(report));
            part.insert("engine".into(), self.engine());
        }

        let sections = [
            ("camerasInternal", self.cameras()),
            ("flexbodies", self.flexbodies()),
            ("props", self.props()),
            ("nodes", self.nodes()),
            ("beams", self.beams()),
            ("rails", self.rails()),
            ("slidenodes", self.slidenodes()),
            ("differentials", self.differentials(report)),
            ("triangles", self.triangles(true)),
            ("visualTriangles", self.triangles(false)),
            ("pressureWheels", self.wheels()),
            ("hydros", self.hydros()),
        ];
        for (key, value) in sections {
            if let Some(value) = value {
                part.insert(key.into(), value);
            }
        }

        debug!(part = %part_name(&rig.name), sections = part.len(), "Emitted JBeam part");
        let mut root = Map::new();
        root.insert(part_name(&rig.name), Value::Object(part));
        Value::Object(root)
    }

    fn engine_torque(&self, report: &mut ConversionReport) -> Value {
        let peak = self.rig.engine.as_ref().map_or(0.0, |e| e.torque);
        let points: &[(f64, f64)] = match &self.rig.torque_curve {
            Some(TorqueCurve::Points(points)) => points,
            Some(TorqueCurve::Named(name)) if name.eq_ignore_ascii_case("default") => {
                DEFAULT_TORQUE_CURVE
            }
            Some(TorqueCurve::Named(name)) => {
                report.warn(format!("unknown torque curve '{}', using the default curve", name));
                DEFAULT_TORQUE_CURVE
            }
            None => DEFAULT_TORQUE_CURVE,
        };

        let mut table = Table::new(&["rpm", "torque"]);
        for &(rpm, fraction) in points {
            table.row(vec![json!(rpm), json!(fraction * peak)]);
        }
        table.into_value()
    }

    fn engine(&self) -> Value {
        let mut engine = Map::new();
        let Some(e) = &self.rig.engine else {
            return Value::Object(engine);
        };
        let option = self.rig.engoption.as_ref();

        let idle = option.and_then(|o| o.idle_rpm).unwrap_or(DEFAULT_IDLE_RPM);
        engine.insert("idleRPM".into(), json!(idle));
        engine.insert("maxRPM".into(), json!(e.shift_up_rpm * 1.25));
        engine.insert("shiftDownRPM".into(), json!(e.shift_down_rpm));
        engine.insert("shiftUpRPM".into(), json!(e.shift_up_rpm));
        engine.insert("differential".into(), json!(e.differential));
        engine.insert(
            "inertia".into(),
            json!(option.map_or(DEFAULT_INERTIA, |o| o.inertia)),
        );

        // reverse is written as a positive ratio in rigs
        let gears: Vec<f64> = e
            .gears
            .iter()
            .enumerate()
            .map(|(i, &g)| if i == 0 { -g.abs() } else { g })
            .collect();
        engine.insert("gears".into(), json!(gears));

        if let Some(o) = option {
            if let Some(force) = o.clutch_force {
                engine.insert("clutchTorque".into(), json!(force));
            }
            if let Some(time) = o.clutch_time {
                engine.insert("clutchDuration".into(), json!(time));
            }
            if let Some(stall) = o.stall_rpm {
                engine.insert("stallRPM".into(), json!(stall));
            }
        }
        Value::Object(engine)
    }

    fn cameras(&self) -> Option<Value> {
        if self.rig.cameras.is_empty() {
            return None;
        }
        let mut table = Table::new(&[
            "type", "x", "y", "z", "fov", "id1:", "id2:", "id3:", "id4:", "id5:", "id6:",
        ]);
        table.note(json!({ "nodeWeight": CAMERA_NODE_WEIGHT }));
        for camera in &self.rig.cameras {
            table.set("beamSpring", camera.spring);
            table.set("beamDamp", camera.damp);
            let [x, y, z] = self.transform.apply(camera.position);
            let mut row = vec![json!("dash"), json!(x), json!(y), json!(z), json!(camera.fov)];
            row.extend(camera.nodes.iter().take(6).map(id));
            table.row(row);
        }
        Some(table.into_value())
    }

    /// `{pos, rot, scale}` in the target convention
    fn placement(&self, attachment: &VisualAttachment) -> Value {
        json!({
            "pos": xyz(self.transform.apply(attachment.offset)),
            "rot": xyz(self.transform.apply(attachment.rotation)),
            "scale": xyz(self.transform.apply(attachment.scale)),
        })
    }

    fn flexbodies(&self) -> Option<Value> {
        let mut flexbodies = self.rig.flexbodies().peekable();
        flexbodies.peek()?;
        let mut table = Table::new(&["mesh", "[group]:", "nonFlexMaterials"]);
        for fb in flexbodies {
            let group = fb.group.clone().unwrap_or_default();
            let mut row = vec![
                json!(mesh_stem(&fb.resolved_mesh)),
                json!([group]),
                json!(fb.non_flex_materials),
            ];
            if self.settings.transform_properties {
                row.push(self.placement(fb));
            }
            table.row(row);
        }
        Some(table.into_value())
    }

    fn props(&self) -> Option<Value> {
        let mut props = self.rig.props().peekable();
        props.peek()?;
        let mut table = Table::new(&[
            "func",
            "mesh",
            "idRef:",
            "idX:",
            "idY:",
            "baseRotation",
            "rotation",
            "translation",
            "min",
            "max",
            "offset",
            "multiplier",
        ]);
        for prop in props {
            let mut row = vec![
                json!("nop"),
                json!(mesh_stem(&prop.resolved_mesh)),
                id(&prop.reference),
                id(&prop.x_node),
                id(&prop.y_node),
            ];
            if self.settings.transform_properties {
                let zero = xyz([0.0; 3]);
                let (rotation, translation, min, max, multiplier) = match prop.animation {
                    Some(a) if a.factor != 0.0 && a.mode == AnimationMode::Rotation => {
                        (xyz([0.0, 0.0, 1.0]), zero, -180.0, 180.0, a.factor)
                    }
                    Some(a) if a.factor != 0.0 && a.mode == AnimationMode::Translation => {
                        (zero.clone(), xyz([0.0, 0.0, 1.0]), -1.0, 1.0, a.factor)
                    }
                    _ => (zero.clone(), zero, 0.0, 0.0, 1.0),
                };
                row.extend([
                    xyz(self.transform.apply(prop.rotation)),
                    rotation,
                    translation,
                    json!(min),
                    json!(max),
                    json!(0.0),
                    json!(multiplier),
                ]);
            }
            table.row(row);
        }
        Some(table.into_value())
    }

    fn nodes(&self) -> Option<Value> {
        if self.rig.nodes.is_empty() {
            return None;
        }
        let mut table = Table::new(&["id", "posX", "posY", "posZ"])
            .assume("frictionCoef", self.settings.default_friction)
            .assume("collision", true)
            .assume("group", "");

        for node in &self.rig.nodes {
            table.set("nodeWeight", node.mass);
            table.set("frictionCoef", node.friction);
            table.set("collision", !node.has(NodeFlag::NoGroundContact));
            if node.groups.is_empty() {
                table.set("group", "");
            } else {
                table.set("group", json!(node.groups));
            }

            let [x, y, z] = self.transform.apply(node.position);
            let mut row = vec![id(&node.id), json!(x), json!(y), json!(z)];
            let mut inline = Map::new();
            if node.fixed {
                inline.insert("fixed".into(), json!(true));
            }
            if node.has(NodeFlag::Hook) {
                inline.insert("couplerTag".into(), json!("fifthwheel"));
            }
            if !inline.is_empty() {
                row.push(Value::Object(inline));
            }
            table.row(row);
        }
        Some(table.into_value())
    }

    fn beams(&self) -> Option<Value> {
        if self.rig.beams.is_empty() {
            return None;
        }
        let mut table = Table::new(&["id1:", "id2:"]).assume("breakGroup", "");
        for beam in &self.rig.beams {
            table.set("beamType", format!("|{}", beam.kind.jbeam_name()));
            table.set("beamSpring", beam.spring);
            table.set("beamDamp", beam.damp);
            table.set("beamDeform", beam.deform);
            table.set("beamStrength", beam.strength);
            if let Some(short) = beam.short_bound {
                table.set("beamShortBound", short);
            }
            if let Some(long) = beam.long_bound {
                table.set("beamLongBound", long);
            }
            if let Some(precompression) = beam.precompression {
                table.set("beamPrecompression", precompression);
            }
            let group = match beam.break_group {
                0 => String::new(),
                n => format!("group{}", n),
            };
            table.set("breakGroup", group);
            table.row(vec![id(&beam.nodes[0]), id(&beam.nodes[1])]);
        }
        Some(table.into_value())
    }

    fn rails(&self) -> Option<Value> {
        if self.rig.rails.is_empty() {
            return None;
        }
        let mut rails = Map::new();
        for rail in &self.rig.rails {
            let links: Vec<Value> = rail.nodes.iter().map(id).collect();
            rails.insert(
                rail.name.clone(),
                json!({ "links:": links, "looped": false, "capped": true }),
            );
        }
        Some(Value::Object(rails))
    }

    fn slidenodes(&self) -> Option<Value> {
        if self.rig.slidenodes.is_empty() {
            return None;
        }
        let mut table = Table::new(&[
            "id:", "railName", "attached", "fixToRail", "tolerance", "spring", "strength",
            "capStrength",
        ]);
        for s in &self.rig.slidenodes {
            let strength = if s.strength.is_finite() {
                s.strength
            } else {
                UNBREAKABLE_STRENGTH
            };
            table.row(vec![
                id(&s.node),
                json!(s.rail),
                json!(true),
                json!(true),
                json!(s.tolerance),
                json!(s.spring),
                json!(strength),
                json!(SLIDENODE_CAP_STRENGTH),
            ]);
        }
        Some(table.into_value())
    }

    /// Name of the wheel spanning `pair`, in either node order
    fn wheel_name(&self, pair: &[NodeId; 2]) -> Option<String> {
        self.rig
            .wheels
            .iter()
            .position(|w| {
                (w.node1 == pair[0] && w.node2 == pair[1])
                    || (w.node1 == pair[1] && w.node2 == pair[0])
            })
            .map(|i| format!("rorwheel{}", i))
    }

    fn differentials(&self, report: &mut ConversionReport) -> Option<Value> {
        if self.rig.axles.is_empty() {
            return None;
        }
        let mut table = Table::new(&[
            "wheelName1",
            "wheelName2",
            "type",
            "state",
            "closedTorque",
            "engineTorqueCoef",
        ]);
        for axle in &self.rig.axles {
            let (Some(w1), Some(w2)) = (self.wheel_name(&axle.wheel1), self.wheel_name(&axle.wheel2)) else {
                warn!(line = axle.line, "Axle does not match any wheel");
                report.warn_at(axle.line, "axle does not match a wheel, differential skipped");
                continue;
            };
            let mode = axle.modes.first().copied().unwrap_or(DifferentialMode::Open);
            let state = if mode == DifferentialMode::Open { "open" } else { "closed" };
            table.row(vec![
                json!(w1),
                json!(w2),
                json!(mode.jbeam_name()),
                json!(state),
                json!(10000),
                json!(1),
            ]);
        }
        Some(table.into_value())
    }

    /// Collision (`true`) or visual-only (`false`) triangles, quads split
    fn triangles(&self, collision: bool) -> Option<Value> {
        let split: Vec<_> = self.rig.quads.iter().flat_map(|q| q.split()).collect();
        let mut selected = self
            .rig
            .triangles
            .iter()
            .chain(&split)
            .filter(|t| t.kind.is_collision() == collision)
            .peekable();
        selected.peek()?;

        let mut table = Table::new(&["id1:", "id2:", "id3:"]);
        for triangle in selected {
            let material = self.settings.map_material(&triangle.material);
            table.set("material", format!("|{}", material));
            if collision {
                table.set("dragCoef", triangle.drag);
            }
            table.row(triangle.nodes.iter().map(id).collect());
        }
        Some(table.into_value())
    }

    fn wheels(&self) -> Option<Value> {
        if self.rig.wheels.is_empty() {
            return None;
        }
        let mut table = Table::new(&[
            "name", "hubGroup", "group", "node1:", "node2:", "nodeS", "nodeArm:", "wheelDir",
        ])
        .assume("propulsed", 0);

        if let Some(brakes) = &self.rig.brakes {
            table.note(json!({ "brakeTorque": brakes.force, "parkingTorque": brakes.parking_force }));
        }
        if self.rig.rollon {
            table.note(json!({ "selfCollision": true }));
        }

        let mut wrote_tire_globals = false;
        for (i, wheel) in self.rig.wheels.iter().enumerate() {
            let has_tire = wheel.kind.has_tire();
            table.set("hasTire", has_tire);
            table.set(
                "hubNodeMaterial",
                if has_tire { "|NM_METAL" } else { "|NM_RUBBER" },
            );
            if self.rig.axles.is_empty() {
                table.set("propulsed", u8::from(wheel.propulsion > 0));
            }
            table.set("hubWidth", wheel.width);
            table.set("tireWidth", wheel.width);
            table.set("numRays", wheel.rays);

            let rays = f64::from(wheel.rays.max(1));
            if has_tire {
                table.set("nodeWeight", wheel.mass / (rays * 4.0));
                table.set("hubNodeWeight", wheel.mass / (rays * 4.0));
                if !wrote_tire_globals {
                    wrote_tire_globals = true;
                    table.note(json!({ "disableMeshBreaking": true }));
                    table.note(json!({ "disableHubMeshBreaking": false }));
                    table.note(json!({ "enableTireReinfBeams": true }));
                    table.note(json!({ "pressurePSI": 30 }));
                }
                self.tire_options(&mut table, wheel);
            } else {
                table.set("hubNodeWeight", wheel.mass / (rays * 2.0));
                table.set("beamSpring", wheel.spring);
                table.set("beamDamp", wheel.damp);
                table.set("hubRadius", wheel.radius);
            }

            let snode = match &wheel.rigidity_node {
                Some(node) => id(node),
                None => json!(9999),
            };
            let direction: i32 = if wheel.propulsion == 2 { -1 } else { i32::from(wheel.propulsion) };
            table.row(vec![
                json!(format!("rorwheel{}", i)),
                json!("none"),
                json!("none"),
                id(&wheel.node1),
                id(&wheel.node2),
                snode,
                id(&wheel.arm),
                json!(direction),
            ]);
        }
        Some(table.into_value())
    }

    fn tire_options(&self, table: &mut Table, wheel: &Wheel) {
        table.set("beamSpring", wheel.rim_spring.unwrap_or(wheel.spring));
        table.set("beamDamp", wheel.rim_damp.unwrap_or(wheel.damp));
        for key in [
            "wheelSideBeamDamp",
            "wheelSideBeamDampExpansion",
            "wheelReinfBeamDamp",
            "wheelTreadBeamDamp",
            "wheelPeripheryBeamDamp",
        ] {
            table.set(key, wheel.damp);
        }
        for key in [
            "wheelSideBeamSpringExpansion",
            "wheelReinfBeamSpring",
            "wheelTreadBeamSpring",
            "wheelPeripheryBeamSpring",
        ] {
            table.set(key, wheel.spring);
        }
        table.set("radius", wheel.radius);
        if let Some(rim) = wheel.rim_radius {
            table.set("hubRadius", rim);
        }
        if wheel.kind == WheelKind::Flexbody {
            if let Some(mesh) = &wheel.tyre_mesh {
                table.set("tireMesh", mesh_stem(mesh));
            }
            if let Some(mesh) = &wheel.rim_mesh {
                table.set("hubMesh", mesh_stem(mesh));
            }
        }
    }

    fn hydros(&self) -> Option<Value> {
        if self.rig.hydros.is_empty() {
            return None;
        }
        let mut table = Table::new(&["id1:", "id2:"]);
        for hydro in &self.rig.hydros {
            table.set("beamSpring", hydro.spring);
            table.set("beamDamp", hydro.damp);
            table.set("beamDeform", hydro.deform);
            table.set("beamStrength", hydro.strength);
            table.row(vec![
                id(&hydro.nodes[0]),
                id(&hydro.nodes[1]),
                json!({
                    "inputSource": "steering",
                    "inputFactor": hydro.factor,
                    "inRate": 0.25,
                    "outRate": 0.25,
                }),
            ]);
        }
        Some(table.into_value())
    }
}

/// Emit the JBeam tree for `rig`
pub fn emit_jbeam(rig: &Rig, settings: &ConversionSettings, report: &mut ConversionReport) -> Value {
    JBeamEmitter::new(rig, settings).emit(report)
}

/// Count of attachments of one kind, for statistics
pub fn attachment_count(rig: &Rig, kind: AttachmentKind) -> usize {
    rig.attachments.iter().filter(|a| a.kind == kind).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::resolve_node_groups;
    use crate::names::resolve_mesh_names;
    use crate::parser::parse_rig;

    fn emit_with(src: &str, settings: &ConversionSettings) -> (Value, ConversionReport) {
        let mut report = ConversionReport::default();
        let mut rig = parse_rig(src, settings, &mut report);
        resolve_mesh_names(&mut rig);
        resolve_node_groups(&mut rig, false);
        let value = emit_jbeam(&rig, settings, &mut report);
        (value, report)
    }

    fn emit(src: &str) -> Value {
        emit_with(src, &ConversionSettings::default()).0
    }

    #[test]
    fn test_part_name() {
        assert_eq!(part_name("My Truck (v2)"), "my_truck_v2");
        assert_eq!(part_name("***"), "vehicle");
    }

    #[test]
    fn test_minimal_document_shape() {
        let doc = emit("Box\nnodes\n1,0,0,0\n2,1,2,3\nbeams\n1,2\n");
        let part = &doc["box"];
        let keys: Vec<&str> = part.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["information", "slotType", "nodes", "beams"]);
        assert_eq!(part["information"]["authors"], "rig2jbeam");

        let nodes = part["nodes"].as_array().unwrap();
        assert_eq!(nodes[0], json!(["id", "posX", "posY", "posZ"]));
        // y and z swapped
        assert!(nodes.contains(&json!(["node2", 1.0, 3.0, 2.0])));

        let beams = part["beams"].as_array().unwrap();
        assert_eq!(beams[0], json!(["id1:", "id2:"]));
        assert_eq!(beams[1], json!({ "beamType": "|NORMAL" }));
        assert_eq!(beams.last().unwrap(), &json!(["node1", "node2"]));
    }

    #[test]
    fn test_options_written_only_on_change() {
        let doc = emit("t\nnodes\n1,0,0,0\n2,1,0,0\n3,2,0,0\nbeams\n1,2\n2,3\nset_beam_defaults 100\n1,3\n");
        let beams = doc["t"]["beams"].as_array().unwrap();
        let springs: Vec<&Value> = beams.iter().filter_map(|r| r.get("beamSpring")).collect();
        assert_eq!(springs, vec![&json!(9_000_000.0), &json!(100.0)]);
    }

    #[test]
    fn test_identity_transform_and_no_properties() {
        let settings = ConversionSettings {
            transform: CoordinateTransform::Identity,
            transform_properties: false,
            ..Default::default()
        };
        let (doc, _) = emit_with(
            "t\nnodes\n1,0,0,0\n2,1,2,3\n3,0,1,0\nbeams\n1,2\nflexbodies\n1,2,3,0.1,0.2,0.3,0,0,0,Body.mesh\n",
            &settings,
        );
        let nodes = doc["t"]["nodes"].as_array().unwrap();
        assert!(nodes.contains(&json!(["node2", 1.0, 2.0, 3.0])));
        let flex = doc["t"]["flexbodies"].as_array().unwrap();
        assert_eq!(flex[1], json!(["Body", ["body_flexbody"], []]));
    }

    #[test]
    fn test_flexbody_placement_is_transformed() {
        let doc = emit(
            "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\nbeams\n1,2\nflexbodies\n1,2,3,0.1,0.2,0.3,10,20,30,Body.mesh,1,2,3\n",
        );
        let row = &doc["t"]["flexbodies"][1];
        assert_eq!(row[3]["pos"], json!({ "x": 0.1, "y": 0.3, "z": 0.2 }));
        assert_eq!(row[3]["rot"], json!({ "x": 10.0, "y": 30.0, "z": 20.0 }));
        assert_eq!(row[3]["scale"], json!({ "x": 1.0, "y": 3.0, "z": 2.0 }));
    }

    #[test]
    fn test_surfaces_split_by_kind_with_mapped_material() {
        let doc = emit(
            "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\n4,1,1,0\nbeams\n1,2\ntriangles\n1,2,3,c\nquads\n1,2,4,3,v,Rubber\n",
        );
        let tris = doc["t"]["triangles"].as_array().unwrap();
        assert_eq!(tris[1], json!({ "material": "|NM_METAL" }));
        assert_eq!(tris.last().unwrap(), &json!(["node1", "node2", "node3"]));
        let visual = doc["t"]["visualTriangles"].as_array().unwrap();
        assert_eq!(visual[1], json!({ "material": "|NM_RUBBER" }));
        assert_eq!(visual[2], json!(["node1", "node2", "node4"]));
        assert_eq!(visual[3], json!(["node1", "node4", "node3"]));
    }

    #[test]
    fn test_wheels_and_differentials() {
        let doc = emit(
            r#"t
nodes
1,0,0,0
2,0,1,0
3,1,0,0
4,1,1,0
5,0,0,1
beams
1,2
wheels
0.5, 0.3, 12, 1, 2, 9999, 1, 2, 5, 40, 800000, 4000
0.5, 0.3, 12, 3, 4, 5, 1, 1, 5, 40, 800000, 4000
axles
w1(2 1), w2(3 4), d(l)
"#,
        );
        let wheels = doc["t"]["pressureWheels"].as_array().unwrap();
        let rows: Vec<&Value> = wheels.iter().filter(|r| r.is_array()).skip(1).collect();
        assert_eq!(rows[0], &json!(["rorwheel0", "none", "none", "node1", "node2", 9999, "node5", -1]));
        assert_eq!(rows[1][5], json!("node5"));
        assert!(!wheels.iter().any(|r| r.get("propulsed").is_some()));

        let diffs = doc["t"]["differentials"].as_array().unwrap();
        assert_eq!(diffs[1], json!(["rorwheel0", "rorwheel1", "locked", "closed", 10000, 1]));
    }

    #[test]
    fn test_engine_defaults() {
        let doc = emit("t\nnodes\n1,0,0,0\n2,1,0,0\nbeams\n1,2\nengine\n1000, 4000, 500, 3.0, 3.5, 0, 2.5, 1.0, -1\n");
        let engine = &doc["t"]["engine"];
        assert_eq!(engine["idleRPM"], json!(800.0));
        assert_eq!(engine["maxRPM"], json!(5000.0));
        assert_eq!(engine["gears"], json!([-3.5, 0.0, 2.5, 1.0]));
        let torque = doc["t"]["enginetorque"].as_array().unwrap();
        assert_eq!(torque.len(), DEFAULT_TORQUE_CURVE.len() + 1);
        assert_eq!(torque[6], json!([2500.0, 500.0]));
    }

    #[test]
    fn test_hydros_and_slidenodes() {
        let doc = emit("t\nnodes\n1,0,0,0\n2,1,0,0\n3,2,0,0\nbeams\n1,2\nhydros\n1,2,0.3\nslidenodes\n3, 1, 2\n");
        let hydro = doc["t"]["hydros"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(hydro[2]["inputFactor"], json!(0.3));
        assert_eq!(hydro[2]["inputSource"], json!("steering"));
        let slide = &doc["t"]["slidenodes"][1];
        assert_eq!(slide[1], json!("anonrail1"));
        assert_eq!(slide[6], json!(100_000_000.0));
        assert!(doc["t"]["rails"]["anonrail1"].is_object());
    }
}
