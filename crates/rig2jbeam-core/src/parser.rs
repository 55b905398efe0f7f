//! Section parsers: tokens in, a populated [`Rig`] out
//!
//! Each supported section has a parser that turns one [`Line`] into a typed
//! [`Record`]. A malformed line becomes a line-numbered parse diagnostic and
//! is skipped; parsing never stops early except at `end`.

use std::collections::{BTreeSet, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::defaults::{DefaultsFrame, DefaultsStack};
use crate::report::ConversionReport;
use crate::rig::{
    AnimationMode, AttachmentKind, Axle, Beam, BeamFlag, BeamType, Brakes, DifferentialMode,
    EngOption, Engine, FlagLetter, ForsetEntry, Hydro, HydroFlag, InternalCamera, Node,
    NodeFlag, NodeId, PropAnimation, Quad, Rail, Record, RefNodes, Rig, ShockFlag, Slidenode,
    SurfaceKind, TorqueCurve, Triangle, VisualAttachment, Wheel, WheelKind, WheelSide,
};
use crate::settings::ConversionSettings;
use crate::tokenizer::{Directive, Line, SectionKind, SubmeshBlock, Token, Tokenizer};

/// Ranges wider than this are rejected rather than expanded
const MAX_FORSET_RANGE: u32 = 100_000;

/// Rigidity node value meaning "no rigidity node"
const NO_RIGIDITY_NODE: u32 = 9999;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("expected at least {expected} fields, found {found}")]
    Arity { expected: usize, found: usize },
    #[error("field {index} ({name}): '{value}' is not a valid number")]
    Number {
        index: usize,
        name: &'static str,
        value: String,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Typed access to the fields of one line
struct Fields<'l, 'a> {
    line: &'l Line<'a>,
}

impl<'l, 'a> Fields<'l, 'a> {
    fn new(line: &'l Line<'a>) -> Self {
        Self { line }
    }

    fn len(&self) -> usize {
        self.line.fields.len()
    }

    fn require(&self, expected: usize) -> Result<(), LineError> {
        if self.len() < expected {
            return Err(LineError::Arity {
                expected,
                found: self.len(),
            });
        }
        Ok(())
    }

    fn text(&self, index: usize) -> Option<&'a str> {
        self.line.fields.get(index).copied()
    }

    fn node(&self, index: usize) -> NodeId {
        NodeId::parse(self.text(index).unwrap_or_default())
    }

    fn num(&self, index: usize, name: &'static str) -> Result<f64, LineError> {
        let value = self.text(index).ok_or(LineError::Arity {
            expected: index + 1,
            found: self.len(),
        })?;
        parse_number(value).ok_or_else(|| LineError::Number {
            index,
            name,
            value: value.to_string(),
        })
    }

    fn opt_num(&self, index: usize, name: &'static str) -> Result<Option<f64>, LineError> {
        match self.text(index) {
            Some(_) => self.num(index, name).map(Some),
            None => Ok(None),
        }
    }

    fn count(&self, index: usize, name: &'static str) -> Result<u32, LineError> {
        let value = self.num(index, name)?;
        if value < 0.0 || value > u32::MAX as f64 {
            return Err(LineError::Number {
                index,
                name,
                value: value.to_string(),
            });
        }
        Ok(value as u32)
    }

    fn vec3(&self, start: usize, name: &'static str) -> Result<[f64; 3], LineError> {
        Ok([
            self.num(start, name)?,
            self.num(start + 1, name)?,
            self.num(start + 2, name)?,
        ])
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_flags<F: FlagLetter>(
    text: &str,
    line: usize,
    what: &str,
    report: &mut ConversionReport,
) -> BTreeSet<F> {
    let mut flags = BTreeSet::new();
    for letter in text.chars() {
        match F::from_letter(letter) {
            Some(flag) => {
                flags.insert(flag);
            }
            None => report.warn_at(line, format!("unknown {} option '{}'", what, letter)),
        }
    }
    flags
}

/// Parse `1-4`, `7` and named ids into forset entries
pub fn parse_forset(fields: &[&str]) -> Result<Vec<ForsetEntry>, LineError> {
    let mut entries = Vec::with_capacity(fields.len());
    for field in fields {
        if let Some((a, b)) = field.split_once('-') {
            let (Ok(a), Ok(b)) = (a.trim().parse::<u32>(), b.trim().parse::<u32>()) else {
                return Err(LineError::Invalid(format!("invalid forset range '{}'", field)));
            };
            let (start, end) = (a.min(b), a.max(b));
            if end - start >= MAX_FORSET_RANGE {
                return Err(LineError::Invalid(format!(
                    "forset range '{}' is too large",
                    field
                )));
            }
            entries.push(ForsetEntry::Range { start, end });
        } else if let Ok(n) = field.parse::<u32>() {
            entries.push(ForsetEntry::Range { start: n, end: n });
        } else {
            entries.push(ForsetEntry::Named(NodeId::parse(field)));
        }
    }
    Ok(entries)
}

/// Builds a [`Rig`] from a token stream
pub struct RigParser<'r> {
    defaults: DefaultsStack,
    rig: Rig,
    report: &'r mut ConversionReport,
    submesh_block: SubmeshBlock,
    in_unknown: bool,
    anonymous_rails: usize,
}

impl<'r> RigParser<'r> {
    pub fn new(settings: &ConversionSettings, report: &'r mut ConversionReport) -> Self {
        Self {
            defaults: DefaultsStack::new(DefaultsFrame::from_settings(settings)),
            rig: Rig::default(),
            report,
            submesh_block: SubmeshBlock::Cab,
            in_unknown: false,
            anonymous_rails: 0,
        }
    }

    pub fn parse(mut self, source: &str) -> Rig {
        for token in Tokenizer::new(source) {
            self.token(token);
        }

        if self.rig.name.is_empty() {
            self.report.warn("empty document title, using 'Untitled Rig'");
            self.rig.name = "Untitled Rig".to_string();
        }

        info!(
            name = %self.rig.name,
            nodes = self.rig.nodes.len(),
            beams = self.rig.beams.len(),
            attachments = self.rig.attachments.len(),
            "Parsed rig"
        );
        self.rig
    }

    fn token(&mut self, token: Token<'_>) {
        match token {
            Token::Title { text, .. } => self.rig.name = text.to_string(),
            Token::Section { line, kind } => self.open_section(line, kind),
            Token::SubmeshBlock { block, .. } => self.submesh_block = block,
            Token::UnknownSection { line, keyword } => {
                self.in_unknown = true;
                self.report.warn_at(
                    line,
                    format!("unknown section '{}', contents skipped", keyword),
                );
            }
            Token::Directive {
                directive,
                keyword,
                line,
            } => {
                if let Err(e) = self.directive(directive, &line) {
                    self.report
                        .parse_error(line.number, format!("{}: {}", keyword, e));
                }
            }
            Token::Record { section, line } => self.record(section, &line),
            Token::End { line } => debug!(line, "Reached end directive"),
        }
    }

    fn open_section(&mut self, line: usize, kind: SectionKind) {
        self.in_unknown = false;
        match kind {
            SectionKind::Rollon => self.rig.rollon = true,
            SectionKind::Submesh => self.submesh_block = SubmeshBlock::Cab,
            _ if !kind.is_supported() => self.report.warn_at(
                line,
                format!("section '{}' is not converted, contents skipped", kind.keyword()),
            ),
            _ => {}
        }
    }

    fn record(&mut self, section: Option<SectionKind>, line: &Line<'_>) {
        let Some(section) = section else {
            if !self.in_unknown {
                self.report
                    .warn_at(line.number, "data outside of any section skipped");
            }
            return;
        };
        if !section.is_supported() {
            return;
        }

        match self.parse_record(section, line) {
            Ok(Some(record)) => self.apply(record, line.number),
            Ok(None) => {}
            Err(e) => self
                .report
                .parse_error(line.number, format!("{}: {}", section.keyword(), e)),
        }
    }

    fn directive(&mut self, directive: Directive, line: &Line<'_>) -> Result<(), LineError> {
        let f = Fields::new(line);
        let numbers = |range: std::ops::Range<usize>| -> Result<Vec<f64>, LineError> {
            range
                .filter(|&i| i < f.len())
                .map(|i| f.num(i, "value"))
                .collect()
        };

        match directive {
            Directive::SetBeamDefaults => {
                f.require(2)?;
                self.defaults.set_beam_defaults(&numbers(1..5)?);
            }
            Directive::SetBeamDefaultsScale => {
                f.require(2)?;
                self.defaults.set_beam_scale(&numbers(1..5)?);
            }
            Directive::SetNodeDefaults => {
                f.require(2)?;
                let values = numbers(1..5)?;
                let flags = match f.text(5) {
                    Some(text) => parse_flags(text, line.number, "node", self.report),
                    None => BTreeSet::new(),
                };
                self.defaults.set_node_defaults(&values, flags);
            }
            Directive::DetacherGroup => {
                f.require(2)?;
                let group = match f.text(1) {
                    Some("end") => 0,
                    _ => f.num(1, "group")?.max(0.0) as u32,
                };
                self.defaults.set_detacher_group(group);
            }
            Directive::Author => match f.text(3) {
                Some(name) => self.rig.authors.push(name.replace('_', " ")),
                None => self
                    .report
                    .warn_at(line.number, "author directive without a name"),
            },
            Directive::Forset => {
                let entries = parse_forset(&line.fields[1..])?;
                self.apply(Record::Forset(entries), line.number);
            }
            Directive::Section => self.defaults.push(),
            Directive::EndSection => {
                if !self.defaults.pop() {
                    self.report
                        .warn_at(line.number, "end_section without matching section");
                }
            }
            Directive::Ignored => debug!(line = line.number, "Ignoring directive"),
        }
        Ok(())
    }

    fn parse_record(
        &mut self,
        section: SectionKind,
        line: &Line<'_>,
    ) -> Result<Option<Record>, LineError> {
        let f = Fields::new(line);
        let frame = self.defaults.top();
        let n = line.number;

        let record = match section {
            SectionKind::Globals => {
                f.require(2)?;
                Record::Globals {
                    dry_weight: f.num(0, "dry weight")?,
                    load_weight: f.num(1, "load weight")?,
                    material: f.text(2).map(str::to_string),
                }
            }
            SectionKind::Nodes | SectionKind::Nodes2 => {
                f.require(4)?;
                let mut flags = frame.node.flags.clone();
                if let Some(options) = f.text(4) {
                    flags.extend(parse_flags::<NodeFlag>(options, n, "node", self.report));
                }
                let frame = self.defaults.top();
                let mass_override = if flags.contains(&NodeFlag::LoadBearing) {
                    match f.opt_num(5, "load weight")? {
                        Some(w) => Some(w),
                        None if frame.node.load_weight > 0.0 => Some(frame.node.load_weight),
                        None => None,
                    }
                } else {
                    None
                };
                Record::Node(Node {
                    id: f.node(0),
                    position: f.vec3(1, "position")?,
                    flags,
                    friction: frame.node.friction,
                    mass_override,
                    mass: 0.0,
                    fixed: false,
                    groups: Vec::new(),
                    line: n,
                })
            }
            SectionKind::Beams => {
                f.require(2)?;
                let flags: BTreeSet<BeamFlag> = match f.text(2) {
                    Some(options) => parse_flags(options, n, "beam", self.report),
                    None => BTreeSet::new(),
                };
                let kind = if flags.contains(&BeamFlag::Rope) {
                    BeamType::Rope
                } else if flags.contains(&BeamFlag::Support) {
                    BeamType::Support
                } else {
                    BeamType::Normal
                };
                let frame = self.defaults.top();
                let beam = frame.effective_beam();
                Record::Beam(Beam {
                    nodes: [f.node(0), f.node(1)],
                    spring: beam.spring,
                    damp: beam.damp,
                    deform: beam.deform,
                    strength: beam.strength,
                    kind,
                    invisible: flags.contains(&BeamFlag::Invisible),
                    short_bound: None,
                    long_bound: if kind == BeamType::Support {
                        f.opt_num(3, "extension break limit")?
                    } else {
                        None
                    },
                    precompression: None,
                    break_group: frame.detacher_group,
                    line: n,
                })
            }
            SectionKind::Shocks | SectionKind::Shocks2 => {
                // shocks2 carries separate in/out progression values before the bounds
                let (bounds_at, expected) = match section {
                    SectionKind::Shocks => (4, 7),
                    _ => (10, 13),
                };
                f.require(expected)?;
                let flags: BTreeSet<ShockFlag> = match f.text(expected) {
                    Some(options) => parse_flags(options, n, "shock", self.report),
                    None => BTreeSet::new(),
                };
                let beam = frame.effective_beam();
                Record::Beam(Beam {
                    nodes: [f.node(0), f.node(1)],
                    spring: f.num(2, "spring")?,
                    damp: f.num(3, "damping")?,
                    deform: beam.deform,
                    strength: beam.strength,
                    kind: BeamType::Bounded,
                    invisible: flags.contains(&ShockFlag::Invisible),
                    short_bound: Some(f.num(bounds_at, "short bound")?),
                    long_bound: Some(f.num(bounds_at + 1, "long bound")?),
                    precompression: Some(f.num(bounds_at + 2, "precompression")?),
                    break_group: frame.detacher_group,
                    line: n,
                })
            }
            SectionKind::Hydros => {
                f.require(3)?;
                let flags: BTreeSet<HydroFlag> = match f.text(3) {
                    Some(options) => parse_flags(options, n, "hydro", self.report),
                    None => BTreeSet::new(),
                };
                let beam = self.defaults.top().effective_beam();
                Record::Hydro(Hydro {
                    nodes: [f.node(0), f.node(1)],
                    factor: f.num(2, "lengthening factor")?,
                    flags,
                    spring: beam.spring,
                    damp: beam.damp,
                    deform: beam.deform,
                    strength: beam.strength,
                    line: n,
                })
            }
            SectionKind::Fixes => {
                f.require(1)?;
                Record::Fix(f.node(0))
            }
            SectionKind::Wheels => Record::Wheel(parse_wheel(&f, WheelKind::Basic, self.report)?),
            SectionKind::Wheels2 => {
                Record::Wheel(parse_wheel(&f, WheelKind::Advanced, self.report)?)
            }
            SectionKind::Meshwheels | SectionKind::Meshwheels2 => {
                Record::Wheel(parse_wheel(&f, WheelKind::Mesh, self.report)?)
            }
            SectionKind::Flexbodywheels => {
                Record::Wheel(parse_wheel(&f, WheelKind::Flexbody, self.report)?)
            }
            SectionKind::Flexbodies => {
                Record::Attachment(parse_attachment(&f, AttachmentKind::Flexbody, self.report)?)
            }
            SectionKind::Props => {
                Record::Attachment(parse_attachment(&f, AttachmentKind::Prop, self.report)?)
            }
            SectionKind::Forset => Record::Forset(parse_forset(&line.fields)?),
            SectionKind::Triangles => {
                f.require(3)?;
                Record::Triangle(Triangle {
                    nodes: [f.node(0), f.node(1), f.node(2)],
                    kind: surface_kind(f.text(3).unwrap_or("c"), n, self.report),
                    material: "default".to_string(),
                    drag: f.opt_num(4, "drag")?.unwrap_or(0.0),
                    lift: 0.0,
                    line: n,
                })
            }
            SectionKind::Quads => {
                f.require(4)?;
                Record::Quad(Quad {
                    nodes: [f.node(0), f.node(1), f.node(2), f.node(3)],
                    kind: surface_kind(f.text(4).unwrap_or("c"), n, self.report),
                    material: f.text(5).unwrap_or("default").to_string(),
                    drag: 0.0,
                    lift: f.opt_num(6, "lift")?.unwrap_or(0.0),
                    line: n,
                })
            }
            SectionKind::Submesh => match self.submesh_block {
                SubmeshBlock::Cab => {
                    f.require(3)?;
                    if !f.text(3).is_some_and(|o| o.contains('c')) {
                        return Ok(None);
                    }
                    Record::Triangle(Triangle {
                        nodes: [f.node(0), f.node(1), f.node(2)],
                        kind: SurfaceKind::Collision,
                        material: "default".to_string(),
                        drag: 0.0,
                        lift: 0.0,
                        line: n,
                    })
                }
                SubmeshBlock::Texcoords | SubmeshBlock::Backmesh => return Ok(None),
            },
            SectionKind::Engine => {
                f.require(7)?;
                let mut gears = Vec::new();
                for i in 4..f.len() {
                    let ratio = f.num(i, "gear ratio")?;
                    if ratio == -1.0 {
                        break;
                    }
                    gears.push(ratio);
                }
                if gears.len() < 3 {
                    return Err(LineError::Invalid(
                        "engine needs reverse, neutral and at least one forward gear".to_string(),
                    ));
                }
                Record::Engine(Engine {
                    shift_down_rpm: f.num(0, "shift down rpm")?,
                    shift_up_rpm: f.num(1, "shift up rpm")?,
                    torque: f.num(2, "torque")?,
                    differential: f.num(3, "differential ratio")?,
                    gears,
                    line: n,
                })
            }
            SectionKind::Engoption => {
                f.require(1)?;
                Record::EngOption(EngOption {
                    inertia: f.num(0, "inertia")?,
                    engine_type: f.text(1).unwrap_or("t").to_string(),
                    clutch_force: f.opt_num(2, "clutch force")?,
                    shift_time: f.opt_num(3, "shift time")?,
                    clutch_time: f.opt_num(4, "clutch time")?,
                    post_shift_time: f.opt_num(5, "post shift time")?,
                    stall_rpm: f.opt_num(6, "stall rpm")?,
                    idle_rpm: f.opt_num(7, "idle rpm")?,
                    line: n,
                })
            }
            SectionKind::Torquecurve => {
                f.require(1)?;
                match f.text(0).and_then(parse_number) {
                    None if f.len() == 1 => {
                        Record::TorqueCurve(TorqueCurve::Named(line.fields[0].to_string()))
                    }
                    _ => {
                        f.require(2)?;
                        Record::TorqueCurve(TorqueCurve::Points(vec![(
                            f.num(0, "rpm")?,
                            f.num(1, "torque fraction")?,
                        )]))
                    }
                }
            }
            SectionKind::Brakes => {
                f.require(1)?;
                let force = f.num(0, "brake force")?;
                Record::Brakes(Brakes {
                    force,
                    parking_force: f.opt_num(1, "parking brake force")?.unwrap_or(force),
                })
            }
            SectionKind::Cameras => {
                f.require(3)?;
                Record::RefNodes(RefNodes {
                    center: f.node(0),
                    back: f.node(1),
                    left: f.node(2),
                    line: n,
                })
            }
            SectionKind::Cinecam => {
                f.require(11)?;
                Record::Camera(InternalCamera {
                    position: f.vec3(0, "position")?,
                    nodes: (3..11).map(|i| f.node(i)).collect(),
                    spring: f.opt_num(11, "spring")?.unwrap_or(8000.0),
                    damp: f.opt_num(12, "damping")?.unwrap_or(800.0),
                    fov: 60.0,
                    line: n,
                })
            }
            SectionKind::Axles => Record::Axle(parse_axle(line)?),
            SectionKind::Railgroups => {
                f.require(2)?;
                Record::Rail(Rail {
                    name: format!("rail{}", line.fields[0]),
                    nodes: (1..f.len()).map(|i| f.node(i)).collect(),
                    line: n,
                })
            }
            SectionKind::Slidenodes => {
                f.require(2)?;
                self.parse_slidenode(&f)?
            }
            SectionKind::Minimass => {
                f.require(1)?;
                Record::MinimumMass(f.num(0, "minimum mass")?)
            }
            _ => return Ok(None),
        };
        Ok(Some(record))
    }

    fn parse_slidenode(&mut self, f: &Fields<'_, '_>) -> Result<Record, LineError> {
        let mut spring = 9_000_000.0;
        let mut strength = f64::INFINITY;
        let mut tolerance = 0.0;
        let mut rail = None;
        let mut rail_nodes = Vec::new();

        for field in &f.line.fields[1..] {
            let mut chars = field.chars();
            let option = chars.next().filter(|c| c.is_ascii_alphabetic());
            let value = option.and_then(|_| parse_number(chars.as_str()));
            match (option, value) {
                (Some('s'), Some(v)) => spring = v,
                (Some('b'), Some(v)) => strength = v,
                (Some('t'), Some(v)) => tolerance = v,
                (Some('r'), Some(v)) => rail = Some(format!("rail{}", v as u32)),
                _ => rail_nodes.push(NodeId::parse(field)),
            }
        }

        let anonymous_rail = if rail.is_none() {
            if rail_nodes.len() < 2 {
                return Err(LineError::Invalid(
                    "slidenode needs a railgroup or at least two rail nodes".to_string(),
                ));
            }
            self.anonymous_rails += 1;
            let name = format!("anonrail{}", self.anonymous_rails);
            rail = Some(name.clone());
            Some(Rail {
                name,
                nodes: rail_nodes,
                line: f.line.number,
            })
        } else {
            None
        };

        Ok(Record::Slidenode {
            slidenode: Slidenode {
                node: f.node(0),
                rail: rail.unwrap_or_default(),
                spring,
                strength,
                tolerance,
                line: f.line.number,
            },
            anonymous_rail,
        })
    }

    fn apply(&mut self, record: Record, line: usize) {
        let rig = &mut self.rig;
        match record {
            Record::Globals {
                dry_weight,
                load_weight,
                ..
            } => {
                rig.dry_weight = Some(dry_weight);
                rig.load_weight = Some(load_weight);
            }
            Record::Node(node) => {
                let id = node.id.clone();
                if !rig.add_node(node) {
                    self.report
                        .warn_at(line, format!("node '{}' defined twice, later definition ignored", id));
                }
            }
            Record::Beam(beam) => rig.beams.push(beam),
            Record::Hydro(hydro) => rig.hydros.push(hydro),
            Record::Fix(id) => match rig.node_mut(&id) {
                Some(node) => node.fixed = true,
                None => self
                    .report
                    .warn_at(line, format!("cannot fix unknown node '{}'", id)),
            },
            Record::Wheel(wheel) => rig.wheels.push(wheel),
            Record::Attachment(attachment) => rig.attachments.push(attachment),
            Record::Forset(entries) => {
                let Some(index) = rig
                    .attachments
                    .iter()
                    .rposition(|a| a.kind == AttachmentKind::Flexbody)
                else {
                    self.report
                        .warn_at(line, "forset without a preceding flexbody ignored");
                    return;
                };
                // unresolved entries are reported by the validator
                let resolved: Vec<NodeId> = entries
                    .iter()
                    .flat_map(|entry| entry.resolve(rig).0)
                    .collect();
                let flexbody = &mut rig.attachments[index];
                let mut seen: HashSet<NodeId> = flexbody.forset_nodes.iter().cloned().collect();
                for id in resolved {
                    if seen.insert(id.clone()) {
                        flexbody.forset_nodes.push(id);
                    }
                }
                flexbody.forset.extend(entries);
            }
            Record::Triangle(triangle) => rig.triangles.push(triangle),
            Record::Quad(quad) => rig.quads.push(quad),
            Record::Engine(engine) => {
                if rig.engine.replace(engine).is_some() {
                    self.report
                        .warn_at(line, "engine defined twice, using the last one");
                }
            }
            Record::EngOption(engoption) => rig.engoption = Some(engoption),
            Record::TorqueCurve(curve) => match (&mut rig.torque_curve, curve) {
                (Some(TorqueCurve::Points(points)), TorqueCurve::Points(more)) => {
                    points.extend(more)
                }
                (slot, curve) => *slot = Some(curve),
            },
            Record::Brakes(brakes) => rig.brakes = Some(brakes),
            Record::RefNodes(refs) => rig.ref_nodes = Some(refs),
            Record::Camera(camera) => rig.cameras.push(camera),
            Record::Axle(axle) => rig.axles.push(axle),
            Record::Rail(rail) => rig.rails.push(rail),
            Record::Slidenode {
                slidenode,
                anonymous_rail,
            } => {
                rig.rails.extend(anonymous_rail);
                rig.slidenodes.push(slidenode);
            }
            Record::MinimumMass(mass) => rig.minimum_mass = Some(mass),
        }
    }
}

/// Parse a whole document into a [`Rig`], recording diagnostics in `report`
pub fn parse_rig(source: &str, settings: &ConversionSettings, report: &mut ConversionReport) -> Rig {
    RigParser::new(settings, report).parse(source)
}

fn surface_kind(options: &str, line: usize, report: &mut ConversionReport) -> SurfaceKind {
    let (mut collision, mut visual) = (false, false);
    for letter in options.chars() {
        match letter {
            'c' => collision = true,
            'v' => visual = true,
            other => report.warn_at(line, format!("unknown surface option '{}'", other)),
        }
    }
    match (collision, visual) {
        (true, true) => SurfaceKind::Both,
        (false, true) => SurfaceKind::Visual,
        _ => SurfaceKind::Collision,
    }
}

fn parse_wheel(
    f: &Fields<'_, '_>,
    kind: WheelKind,
    report: &mut ConversionReport,
) -> Result<Wheel, LineError> {
    // Index of the width field; every later field is relative to it
    let (radius_fields, expected) = match kind {
        WheelKind::Basic => (1, 12),
        WheelKind::Advanced => (2, 15),
        WheelKind::Mesh => (2, 16),
        WheelKind::Flexbody => (2, 18),
    };
    f.require(expected)?;

    let (radius, rim_radius) = match kind {
        WheelKind::Basic => (f.num(0, "radius")?, None),
        // wheels2 lists the rim first
        WheelKind::Advanced => (f.num(1, "tyre radius")?, Some(f.num(0, "rim radius")?)),
        WheelKind::Mesh | WheelKind::Flexbody => {
            (f.num(0, "tyre radius")?, Some(f.num(1, "rim radius")?))
        }
    };
    let base = radius_fields;
    let rigidity_node = match f.text(base + 4).and_then(parse_number) {
        Some(v) if v == NO_RIGIDITY_NODE as f64 => None,
        _ => Some(f.node(base + 4)),
    };

    let mut wheel = Wheel {
        kind,
        radius,
        rim_radius,
        width: f.num(base, "width")?,
        rays: f.count(base + 1, "ray count")?,
        node1: f.node(base + 2),
        node2: f.node(base + 3),
        rigidity_node,
        braking: f.count(base + 5, "braking")?.min(u8::MAX as u32) as u8,
        propulsion: f.count(base + 6, "propulsion")?.min(u8::MAX as u32) as u8,
        arm: f.node(base + 7),
        mass: f.num(base + 8, "mass")?,
        spring: f.num(base + 9, "spring")?,
        damp: f.num(base + 10, "damping")?,
        rim_spring: None,
        rim_damp: None,
        side: None,
        rim_mesh: None,
        tyre_mesh: None,
        line: f.line.number,
    };
    if wheel.rays == 0 {
        return Err(LineError::Invalid("wheel needs at least one ray".to_string()));
    }

    match kind {
        WheelKind::Basic => {}
        WheelKind::Advanced => {
            // rim pair comes first, tyre pair second
            wheel.rim_spring = Some(wheel.spring);
            wheel.rim_damp = Some(wheel.damp);
            wheel.spring = f.num(base + 11, "tyre spring")?;
            wheel.damp = f.num(base + 12, "tyre damping")?;
        }
        WheelKind::Mesh => {
            wheel.side = wheel_side(f.text(base + 11), f.line.number, report);
            wheel.rim_mesh = f.text(base + 12).map(str::to_string);
        }
        WheelKind::Flexbody => {
            wheel.rim_spring = Some(f.num(base + 11, "rim spring")?);
            wheel.rim_damp = Some(f.num(base + 12, "rim damping")?);
            wheel.side = wheel_side(f.text(base + 13), f.line.number, report);
            wheel.rim_mesh = f.text(base + 14).map(str::to_string);
            wheel.tyre_mesh = f.text(base + 15).map(str::to_string);
        }
    }
    Ok(wheel)
}

fn wheel_side(text: Option<&str>, line: usize, report: &mut ConversionReport) -> Option<WheelSide> {
    match text {
        Some("l") => Some(WheelSide::Left),
        Some("r") => Some(WheelSide::Right),
        Some(other) => {
            report.warn_at(line, format!("unknown wheel side '{}'", other));
            None
        }
        None => None,
    }
}

fn parse_attachment(
    f: &Fields<'_, '_>,
    kind: AttachmentKind,
    report: &mut ConversionReport,
) -> Result<VisualAttachment, LineError> {
    f.require(10)?;
    let mesh = f.text(9).unwrap_or_default().to_string();

    let mut scale = [1.0; 3];
    let mut animation = None;
    match kind {
        AttachmentKind::Flexbody => {
            if f.len() >= 13 {
                scale = f.vec3(10, "scale")?;
            }
        }
        AttachmentKind::Prop => {
            if let Some(factor) = f.opt_num(10, "animation factor")? {
                let mode = match f.text(11).unwrap_or("rotation") {
                    "rotation" => AnimationMode::Rotation,
                    "translation" => AnimationMode::Translation,
                    "none" => AnimationMode::None,
                    other => {
                        report.warn_at(
                            f.line.number,
                            format!("unknown prop animation mode '{}'", other),
                        );
                        AnimationMode::None
                    }
                };
                animation = Some(PropAnimation { factor, mode });
            }
        }
    }

    Ok(VisualAttachment {
        kind,
        reference: f.node(0),
        x_node: f.node(1),
        y_node: f.node(2),
        offset: f.vec3(3, "offset")?,
        rotation: f.vec3(6, "rotation")?,
        scale,
        resolved_mesh: mesh.clone(),
        mesh,
        forset: Vec::new(),
        forset_nodes: Vec::new(),
        non_flex_materials: Vec::new(),
        animation,
        group: None,
        members: Vec::new(),
        line: f.line.number,
    })
}

/// `w1(a b), w2(c d), d(lo)`
fn parse_axle(line: &Line<'_>) -> Result<Axle, LineError> {
    fn group<'t>(text: &'t str, key: &str) -> Option<&'t str> {
        let start = text.find(key)? + key.len();
        let end = text[start..].find(')')? + start;
        Some(&text[start..end])
    }
    fn pair(text: &str, key: &str) -> Result<[NodeId; 2], LineError> {
        let inner = group(text, key)
            .ok_or_else(|| LineError::Invalid(format!("axle is missing '{}...)'", key)))?;
        let ids: Vec<&str> = crate::tokenizer::split_fields(inner);
        match ids.as_slice() {
            [a, b] => Ok([NodeId::parse(a), NodeId::parse(b)]),
            _ => Err(LineError::Invalid(format!(
                "axle wheel '{}' needs exactly two nodes",
                key.trim_end_matches('(')
            ))),
        }
    }

    let modes = match group(line.text, "d(") {
        Some(letters) => letters
            .chars()
            .filter_map(DifferentialMode::from_letter)
            .collect(),
        None => vec![DifferentialMode::Open],
    };
    Ok(Axle {
        wheel1: pair(line.text, "w1(")?,
        wheel2: pair(line.text, "w2(")?,
        modes,
        line: line.number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;

    fn parse(src: &str) -> (Rig, ConversionReport) {
        let mut report = ConversionReport::default();
        let rig = parse_rig(src, &ConversionSettings::default(), &mut report);
        (rig, report)
    }

    #[test]
    fn test_minimal_rig() {
        let (rig, report) = parse(
            r#"Test Truck
globals
5000, 1000, tracks/semi
nodes
1, 0.0, 0.0, 0.0
2, 1.0, 0.0, 0.0, l
beams
1, 2
end
"#,
        );
        assert_eq!(rig.name, "Test Truck");
        assert_eq!(rig.dry_weight, Some(5000.0));
        assert_eq!(rig.nodes.len(), 2);
        assert!(rig.nodes[1].has(NodeFlag::LoadBearing));
        assert_eq!(rig.beams.len(), 1);
        assert_eq!(rig.beams[0].nodes[0].as_str(), "node1");
        assert_eq!(rig.beams[0].spring, 9_000_000.0);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_malformed_line_is_skipped_with_line_number() {
        let (rig, report) = parse("t\nnodes\n1, 0, 0, 0\n2, 1, oops, 0\n3, 2, 0, 0\n");
        assert_eq!(rig.nodes.len(), 2);
        let err = report.of(Severity::Parse).next().unwrap();
        assert_eq!(err.line, Some(4));
        assert!(err.message.contains("oops"));
    }

    #[test]
    fn test_unknown_flag_letter_is_warning() {
        let (rig, report) = parse("t\nnodes\n1, 0, 0, 0, lq\n");
        assert_eq!(rig.nodes.len(), 1);
        assert_eq!(report.count(Severity::Warning), 1);
        assert_eq!(report.count(Severity::Parse), 0);
    }

    #[test]
    fn test_beam_defaults_apply_to_later_beams_only() {
        let (rig, _) = parse(
            r#"t
nodes
1, 0, 0, 0
2, 1, 0, 0
3, 2, 0, 0
beams
1, 2
set_beam_defaults 100, 10, 1000, 2000
set_beam_defaults_scale 2, 1, 1, 1
2, 3
detacher_group 4
1, 3, r
"#,
        );
        assert_eq!(rig.beams[0].spring, 9_000_000.0);
        assert_eq!(rig.beams[1].spring, 200.0);
        assert_eq!(rig.beams[1].damp, 10.0);
        assert_eq!(rig.beams[1].break_group, 0);
        assert_eq!(rig.beams[2].break_group, 4);
        assert_eq!(rig.beams[2].kind, BeamType::Rope);
    }

    #[test]
    fn test_section_scope_pops_defaults() {
        let (rig, report) = parse(
            r#"t
nodes
1, 0, 0, 0
2, 1, 0, 0
beams
section 1 opt
set_beam_defaults 500
1, 2
end_section
2, 1
end_section
"#,
        );
        assert_eq!(rig.beams[0].spring, 500.0);
        assert_eq!(rig.beams[1].spring, 9_000_000.0);
        assert_eq!(report.count(Severity::Warning), 1);
    }

    #[test]
    fn test_node_defaults_and_load_override() {
        let (rig, _) = parse(
            r#"t
nodes
set_node_defaults 25, 0.5, 1, 1
1, 0, 0, 0, l
2, 1, 0, 0, l, 80
3, 2, 0, 0
"#,
        );
        assert_eq!(rig.nodes[0].mass_override, Some(25.0));
        assert_eq!(rig.nodes[1].mass_override, Some(80.0));
        assert_eq!(rig.nodes[2].mass_override, None);
        assert_eq!(rig.nodes[2].friction, 0.5);
    }

    #[test]
    fn test_flexbody_with_forset_ranges() {
        let (rig, _) = parse(
            r#"t
nodes
0, 0, 0, 0
1, 1, 0, 0
2, 0, 1, 0
3, 1, 1, 0
4, 0, 0, 1
5, 1, 0, 1
6, 0, 1, 1
flexbodies
0, 1, 2, 0.1, 0.2, 0.3, 0, 90, 0, Body.mesh
forset 4-6, 9, hub
"#,
        );
        let fb = &rig.attachments[0];
        assert_eq!(fb.kind, AttachmentKind::Flexbody);
        assert_eq!(fb.offset, [0.1, 0.2, 0.3]);
        assert_eq!(fb.mesh, "Body.mesh");
        assert_eq!(
            fb.forset,
            vec![
                ForsetEntry::Range { start: 4, end: 6 },
                ForsetEntry::Range { start: 9, end: 9 },
                ForsetEntry::Named(NodeId::parse("hub")),
            ]
        );
        let ids: Vec<&str> = fb.forset_nodes.iter().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["node4", "node5", "node6"]);
    }

    #[test]
    fn test_forset_numbers_index_named_nodes() {
        let (rig, _) = parse(
            r#"t
nodes2
fl, -1, 1, 0
fr, 1, 1, 0
rl, -1, -1, 0
rr, 1, -1, 0
flexbodies
fl, fr, rl, 0, 0, 0, 0, 0, 0, body.mesh
forset 0-3
"#,
        );
        let ids: Vec<&str> = rig.attachments[0].forset_nodes.iter().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["fl", "fr", "rl", "rr"]);
    }

    #[test]
    fn test_forset_block_section() {
        let (rig, _) = parse(
            "t\nnodes\n0,0,0,0\n1,1,0,0\n2,0,1,0\n3,1,1,0\n4,0,0,1\n5,1,0,1\nflexbodies\n0, 1, 2, 0, 0, 0, 0, 0, 0, a.mesh\nforset\n1-2\n5\n",
        );
        assert_eq!(rig.attachments[0].forset_nodes.len(), 3);
    }

    #[test]
    fn test_forset_without_flexbody_warns() {
        let (_, report) = parse("t\nnodes\n1,0,0,0\nforset 1-2\n");
        assert_eq!(report.count(Severity::Warning), 1);
    }

    #[test]
    fn test_prop_animation() {
        let (rig, _) = parse("t\nprops\n1, 2, 3, 0, 0, 0, 0, 0, 0, dash.mesh, 2.5, translation\n");
        let prop = &rig.attachments[0];
        assert_eq!(prop.kind, AttachmentKind::Prop);
        assert_eq!(
            prop.animation,
            Some(PropAnimation {
                factor: 2.5,
                mode: AnimationMode::Translation
            })
        );
    }

    #[test]
    fn test_wheels_and_wheels2_layouts() {
        let (rig, report) = parse(
            r#"t
wheels
0.5, 0.3, 12, 1, 2, 9999, 1, 1, 3, 40, 800000, 4000
wheels2
0.3, 0.5, 0.3, 12, 1, 2, 9999, 1, 2, 3, 40, 900000, 5000, 400000, 100
"#,
        );
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        let basic = &rig.wheels[0];
        assert_eq!(basic.kind, WheelKind::Basic);
        assert_eq!(basic.rays, 12);
        assert_eq!(basic.rigidity_node, None);
        assert_eq!(basic.arm.as_str(), "node3");
        let adv = &rig.wheels[1];
        assert_eq!(adv.radius, 0.5);
        assert_eq!(adv.rim_radius, Some(0.3));
        assert_eq!(adv.rim_spring, Some(900000.0));
        assert_eq!(adv.spring, 400000.0);
        assert_eq!(adv.propulsion, 2);
    }

    #[test]
    fn test_flexbodywheels_layout() {
        let (rig, report) = parse(
            "t\nflexbodywheels\n0.45, 0.25, 0.3, 16, 1, 2, 5, 1, 1, 3, 30, 500000, 50, 900000, 200, r, rim.mesh, tyre.mesh\n",
        );
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        let w = &rig.wheels[0];
        assert_eq!(w.kind, WheelKind::Flexbody);
        assert_eq!(w.rigidity_node, Some(NodeId::parse("5")));
        assert_eq!(w.side, Some(WheelSide::Right));
        assert_eq!(w.tyre_mesh.as_deref(), Some("tyre.mesh"));
        assert_eq!(w.rim_spring, Some(900000.0));
    }

    #[test]
    fn test_surfaces() {
        let (rig, _) = parse(
            r#"t
triangles
1, 2, 3, cv, 0.3
quads
1, 2, 3, 4, v, rubber, 0.1
submesh
texcoords
1, 0.5, 0.5
cab
1, 2, 3, c
2, 3, 4, n
"#,
        );
        assert_eq!(rig.triangles.len(), 2);
        assert_eq!(rig.triangles[0].kind, SurfaceKind::Both);
        assert_eq!(rig.triangles[0].drag, 0.3);
        assert_eq!(rig.triangles[1].kind, SurfaceKind::Collision);
        assert_eq!(rig.quads[0].kind, SurfaceKind::Visual);
        assert_eq!(rig.quads[0].material, "rubber");
    }

    #[test]
    fn test_engine_section() {
        let (rig, _) = parse(
            r#"t
engine
1000, 3000, 800, 3.5, 4.0, 0, 3.2, 2.1, 1.4, 1.0, -1
engoption
5, t, 10000, 0.2, 0.5, 0.2, 300, 850
torquecurve
1000, 0.7
3000, 1.0
"#,
        );
        let engine = rig.engine.unwrap();
        assert_eq!(engine.gears, vec![4.0, 0.0, 3.2, 2.1, 1.4, 1.0]);
        assert_eq!(rig.engoption.unwrap().idle_rpm, Some(850.0));
        assert_eq!(
            rig.torque_curve,
            Some(TorqueCurve::Points(vec![(1000.0, 0.7), (3000.0, 1.0)]))
        );
    }

    #[test]
    fn test_axles_rails_and_slidenodes() {
        let (rig, report) = parse(
            r#"t
axles
w1(1 2), w2(3 4), d(lo)
railgroups
7, 10, 11, 12
slidenodes
20, r7, s5000
21, 30, 31, t0.1
"#,
        );
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(rig.axles[0].wheel2, [NodeId::parse("3"), NodeId::parse("4")]);
        assert_eq!(
            rig.axles[0].modes,
            vec![DifferentialMode::Locked, DifferentialMode::Open]
        );
        assert_eq!(rig.rails.len(), 2);
        assert_eq!(rig.slidenodes[0].rail, "rail7");
        assert_eq!(rig.slidenodes[0].spring, 5000.0);
        assert_eq!(rig.slidenodes[1].rail, "anonrail1");
        assert_eq!(rig.slidenodes[1].tolerance, 0.1);
    }

    #[test]
    fn test_unsupported_and_unknown_sections_warn() {
        let (rig, report) = parse("t\nropes\n1, 2\nwibble\n3, 4\nbeams\n1, 2\n");
        assert_eq!(rig.beams.len(), 1);
        assert_eq!(report.count(Severity::Warning), 2);
    }

    #[test]
    fn test_author_and_fixes() {
        let (rig, report) = parse("t\nauthor chassis 42 Jane_Doe jane@example.com\nnodes\n1,0,0,0\nfixes\n1\n9\n");
        assert_eq!(rig.authors, vec!["Jane Doe"]);
        assert!(rig.nodes[0].fixed);
        assert_eq!(report.count(Severity::Warning), 1);
    }

    #[test]
    fn test_parse_forset_errors() {
        assert!(parse_forset(&["1-x"]).is_err());
        assert!(parse_forset(&["0-4000000"]).is_err());
        assert_eq!(
            parse_forset(&["5-2"]).unwrap(),
            vec![ForsetEntry::Range { start: 2, end: 5 }]
        );
    }
}
