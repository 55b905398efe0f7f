//! Line tokenizer for rig documents
//!
//! Splits raw text into line-numbered [`Token`]s: the title, section openers,
//! inline directives and data records tagged with the section they belong to.
//! Comment blocks (`description`, `comment`) and everything after `end` never
//! reach the parsers.

use serde::{Deserialize, Serialize};

/// Every section keyword of the rig format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Globals,
    Nodes,
    Nodes2,
    Beams,
    Cameras,
    Cinecam,
    Engine,
    Engoption,
    Engturbo,
    Brakes,
    Hydros,
    Animators,
    Commands,
    Commands2,
    Rotators,
    Rotators2,
    Wings,
    Collisionboxes,
    Rescuer,
    Managedmaterials,
    Contacters,
    Triggers,
    Lockgroups,
    Hooks,
    Submesh,
    Slidenodes,
    Railgroups,
    Ropes,
    Fixes,
    Ties,
    Ropables,
    Particles,
    Rigidifiers,
    Torquecurve,
    Cruisecontrol,
    Axles,
    Shocks,
    Shocks2,
    Flares,
    Flares2,
    Materialflarebindings,
    Props,
    Flexbodies,
    Flexbodywheels,
    Meshwheels,
    Meshwheels2,
    Wheels,
    Wheels2,
    Airbrakes,
    Turboprops,
    Fusedrag,
    Turbojets,
    Pistonprops,
    Screwprops,
    Description,
    Rollon,
    Comment,
    Soundsources,
    Minimass,
    Disabledefaultsounds,
    Guisettings,
    Triangles,
    Quads,
    Forset,
}

const SECTIONS: &[(&str, SectionKind)] = &[
    ("globals", SectionKind::Globals),
    ("nodes", SectionKind::Nodes),
    ("nodes2", SectionKind::Nodes2),
    ("beams", SectionKind::Beams),
    ("cameras", SectionKind::Cameras),
    ("cinecam", SectionKind::Cinecam),
    ("engine", SectionKind::Engine),
    ("engoption", SectionKind::Engoption),
    ("engturbo", SectionKind::Engturbo),
    ("brakes", SectionKind::Brakes),
    ("hydros", SectionKind::Hydros),
    ("animators", SectionKind::Animators),
    ("commands", SectionKind::Commands),
    ("commands2", SectionKind::Commands2),
    ("rotators", SectionKind::Rotators),
    ("rotators2", SectionKind::Rotators2),
    ("wings", SectionKind::Wings),
    ("collisionboxes", SectionKind::Collisionboxes),
    ("rescuer", SectionKind::Rescuer),
    ("managedmaterials", SectionKind::Managedmaterials),
    ("contacters", SectionKind::Contacters),
    ("triggers", SectionKind::Triggers),
    ("lockgroups", SectionKind::Lockgroups),
    ("hooks", SectionKind::Hooks),
    ("submesh", SectionKind::Submesh),
    ("slidenodes", SectionKind::Slidenodes),
    ("railgroups", SectionKind::Railgroups),
    ("ropes", SectionKind::Ropes),
    ("fixes", SectionKind::Fixes),
    ("ties", SectionKind::Ties),
    ("ropables", SectionKind::Ropables),
    ("particles", SectionKind::Particles),
    ("rigidifiers", SectionKind::Rigidifiers),
    ("torquecurve", SectionKind::Torquecurve),
    ("cruisecontrol", SectionKind::Cruisecontrol),
    ("axles", SectionKind::Axles),
    ("shocks", SectionKind::Shocks),
    ("shocks2", SectionKind::Shocks2),
    ("flares", SectionKind::Flares),
    ("flares2", SectionKind::Flares2),
    ("materialflarebindings", SectionKind::Materialflarebindings),
    ("props", SectionKind::Props),
    ("flexbodies", SectionKind::Flexbodies),
    ("flexbodywheels", SectionKind::Flexbodywheels),
    ("meshwheels", SectionKind::Meshwheels),
    ("meshwheels2", SectionKind::Meshwheels2),
    ("wheels", SectionKind::Wheels),
    ("wheels2", SectionKind::Wheels2),
    ("airbrakes", SectionKind::Airbrakes),
    ("turboprops", SectionKind::Turboprops),
    ("fusedrag", SectionKind::Fusedrag),
    ("turbojets", SectionKind::Turbojets),
    ("pistonprops", SectionKind::Pistonprops),
    ("screwprops", SectionKind::Screwprops),
    ("description", SectionKind::Description),
    ("rollon", SectionKind::Rollon),
    ("comment", SectionKind::Comment),
    ("soundsources", SectionKind::Soundsources),
    ("minimass", SectionKind::Minimass),
    ("disabledefaultsounds", SectionKind::Disabledefaultsounds),
    ("guisettings", SectionKind::Guisettings),
    ("triangles", SectionKind::Triangles),
    ("quads", SectionKind::Quads),
    ("forset", SectionKind::Forset),
];

impl SectionKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        SECTIONS
            .iter()
            .find(|(name, _)| *name == keyword)
            .map(|(_, kind)| *kind)
    }

    pub fn keyword(self) -> &'static str {
        SECTIONS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// Sections whose records are converted; the rest pass through with a warning
    pub fn is_supported(self) -> bool {
        use SectionKind::*;
        matches!(
            self,
            Globals
                | Nodes
                | Nodes2
                | Beams
                | Cameras
                | Cinecam
                | Engine
                | Engoption
                | Brakes
                | Hydros
                | Submesh
                | Slidenodes
                | Railgroups
                | Fixes
                | Torquecurve
                | Axles
                | Shocks
                | Shocks2
                | Props
                | Flexbodies
                | Flexbodywheels
                | Meshwheels
                | Meshwheels2
                | Wheels
                | Wheels2
                | Rollon
                | Minimass
                | Triangles
                | Quads
                | Forset
                | Description
                | Comment
        )
    }

    /// Sections where a lone lowercase word is data, not a keyword
    fn takes_single_word(self) -> bool {
        matches!(
            self,
            SectionKind::Fixes | SectionKind::Torquecurve | SectionKind::Forset
        )
    }

    /// Body lines are free text up to a matching `end_<keyword>` line
    fn block_terminator(self) -> Option<&'static str> {
        match self {
            SectionKind::Description => Some("end_description"),
            SectionKind::Comment => Some("end_comment"),
            _ => None,
        }
    }
}

/// Inline directives, processed where they appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Directive {
    SetBeamDefaults,
    SetBeamDefaultsScale,
    SetNodeDefaults,
    DetacherGroup,
    Author,
    Forset,
    Section,
    EndSection,
    /// Accepted and ignored
    Ignored,
}

impl Directive {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "set_beam_defaults" => Directive::SetBeamDefaults,
            "set_beam_defaults_scale" => Directive::SetBeamDefaultsScale,
            "set_node_defaults" => Directive::SetNodeDefaults,
            "detacher_group" => Directive::DetacherGroup,
            "author" => Directive::Author,
            "forset" => Directive::Forset,
            "section" => Directive::Section,
            "end_section" => Directive::EndSection,
            "set_skeleton_settings"
            | "enable_advanced_deformation"
            | "guid"
            | "fileformatversion"
            | "fileinfo"
            | "slopebrake"
            | "tractioncontrol"
            | "antilockbrakes"
            | "disable_flexbody_shadow"
            | "flexbody_camera_mode"
            | "prop_camera_mode"
            | "sectionconfig"
            | "importcommands"
            | "forwardcommands" => Directive::Ignored,
            _ => return None,
        })
    }
}

/// Sub-blocks inside a `submesh` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmeshBlock {
    Texcoords,
    Cab,
    Backmesh,
}

impl SubmeshBlock {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "texcoords" => Some(SubmeshBlock::Texcoords),
            "cab" => Some(SubmeshBlock::Cab),
            "backmesh" => Some(SubmeshBlock::Backmesh),
            _ => None,
        }
    }
}

/// A comment-stripped, split line
#[derive(Debug, Clone, PartialEq)]
pub struct Line<'a> {
    /// 1-based line number in the source text
    pub number: usize,
    /// Comment-stripped text, for records whose syntax is not plain fields
    pub text: &'a str,
    pub fields: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Title { line: usize, text: &'a str },
    Section { line: usize, kind: SectionKind },
    SubmeshBlock { line: usize, block: SubmeshBlock },
    UnknownSection { line: usize, keyword: &'a str },
    Directive { directive: Directive, keyword: &'a str, line: Line<'a> },
    /// A data line; `section` is `None` outside any known section
    Record { section: Option<SectionKind>, line: Line<'a> },
    End { line: usize },
}

/// Strip `;` and `//` comments and surrounding whitespace
pub fn strip_comment(raw: &str) -> &str {
    let cut = [raw.find(';'), raw.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(raw.len());
    raw[..cut].trim()
}

/// Split a line on commas and/or whitespace, dropping empty fields
pub fn split_fields(text: &str) -> Vec<&str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect()
}

fn looks_like_keyword(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Iterator over the tokens of one document
pub struct Tokenizer<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    section: Option<SectionKind>,
    /// Inside an unknown section: records are tagged `None`
    in_unknown: bool,
    seen_title: bool,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().enumerate(),
            section: None,
            in_unknown: false,
            seen_title: false,
            finished: false,
        }
    }

    fn classify(&mut self, number: usize, raw: &'a str) -> Option<Token<'a>> {
        if !self.seen_title {
            // The title is taken verbatim; comment markers are legal in names
            let text = raw.trim();
            if text.is_empty() {
                return None;
            }
            self.seen_title = true;
            return Some(Token::Title { line: number, text });
        }

        if let Some(end) = self.section.and_then(SectionKind::block_terminator) {
            if raw.trim() == end {
                self.section = None;
            }
            return None;
        }

        let text = strip_comment(raw);
        if text.is_empty() {
            return None;
        }
        let fields = split_fields(text);
        let first = fields[0];

        if first == "end" && fields.len() == 1 {
            self.finished = true;
            return Some(Token::End { line: number });
        }

        if let Some(directive) = Directive::from_keyword(first) {
            // A bare `forset` opens a block of forset lines instead
            if !(directive == Directive::Forset && fields.len() == 1) {
                return Some(Token::Directive {
                    directive,
                    keyword: first,
                    line: Line {
                        number,
                        text,
                        fields,
                    },
                });
            }
        }

        if fields.len() == 1 {
            if let Some(kind) = SectionKind::from_keyword(first) {
                self.section = Some(kind);
                self.in_unknown = false;
                return Some(Token::Section { line: number, kind });
            }
            if self.section == Some(SectionKind::Submesh) {
                if let Some(block) = SubmeshBlock::from_keyword(first) {
                    return Some(Token::SubmeshBlock {
                        line: number,
                        block,
                    });
                }
            }
            let data_word = self
                .section
                .is_some_and(|s| s.takes_single_word() && !self.in_unknown);
            if looks_like_keyword(first) && !data_word {
                self.in_unknown = true;
                return Some(Token::UnknownSection {
                    line: number,
                    keyword: first,
                });
            }
        }

        let section = if self.in_unknown { None } else { self.section };
        Some(Token::Record {
            section,
            line: Line {
                number,
                text,
                fields,
            },
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        while !self.finished {
            let (index, raw) = self.lines.next()?;
            if let Some(token) = self.classify(index + 1, raw) {
                return Some(token);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment_and_split() {
        assert_eq!(strip_comment("1, 0.0, 0.0, 0.0 ; front"), "1, 0.0, 0.0, 0.0");
        assert_eq!(strip_comment("// whole line"), "");
        assert_eq!(split_fields("1,  2,3\tl"), vec!["1", "2", "3", "l"]);
    }

    #[test]
    fn test_sections_and_records() {
        let src = "My Truck\nnodes\n1, 0, 0, 0\n2, 1, 0, 0\nbeams\n1, 2\nend\nnodes\n3, 0, 0, 0\n";
        let tokens: Vec<_> = Tokenizer::new(src).collect();

        assert_eq!(tokens[0], Token::Title { line: 1, text: "My Truck" });
        assert_eq!(
            tokens[1],
            Token::Section {
                line: 2,
                kind: SectionKind::Nodes
            }
        );
        match &tokens[3] {
            Token::Record { section, line } => {
                assert_eq!(*section, Some(SectionKind::Nodes));
                assert_eq!(line.number, 4);
                assert_eq!(line.fields, vec!["2", "1", "0", "0"]);
            }
            other => panic!("unexpected token {:?}", other),
        }
        // nothing after `end`
        assert!(matches!(tokens.last(), Some(Token::End { line: 7 })));
    }

    #[test]
    fn test_unknown_section_swallows_records() {
        let src = "t\nfrobnicators\n1, 2, 3\nbeams\n1, 2\n";
        let tokens: Vec<_> = Tokenizer::new(src).collect();
        assert_eq!(
            tokens[1],
            Token::UnknownSection {
                line: 2,
                keyword: "frobnicators"
            }
        );
        assert!(matches!(&tokens[2], Token::Record { section: None, .. }));
        assert!(matches!(
            &tokens[4],
            Token::Record {
                section: Some(SectionKind::Beams),
                ..
            }
        ));
    }

    #[test]
    fn test_description_block_is_skipped() {
        let src = "t\ndescription\nnodes are great\nbeams\nend_description\nnodes\n1,0,0,0\n";
        let tokens: Vec<_> = Tokenizer::new(src).collect();
        assert_eq!(tokens.len(), 4);
        assert!(matches!(
            tokens[2],
            Token::Section {
                kind: SectionKind::Nodes,
                ..
            }
        ));
    }

    #[test]
    fn test_directives_and_forset_block() {
        let src = "t\nflexbodies\nset_beam_defaults 1,2,3,4\nforset 1-3, 5\nforset\n7\n";
        let tokens: Vec<_> = Tokenizer::new(src).collect();
        assert!(matches!(
            &tokens[2],
            Token::Directive {
                directive: Directive::SetBeamDefaults,
                ..
            }
        ));
        assert!(matches!(
            &tokens[3],
            Token::Directive {
                directive: Directive::Forset,
                ..
            }
        ));
        assert!(matches!(
            tokens[4],
            Token::Section {
                kind: SectionKind::Forset,
                ..
            }
        ));
        assert!(matches!(
            &tokens[5],
            Token::Record {
                section: Some(SectionKind::Forset),
                ..
            }
        ));
    }

    #[test]
    fn test_named_torquecurve_is_data() {
        let src = "t\ntorquecurve\ndefault\n";
        let tokens: Vec<_> = Tokenizer::new(src).collect();
        assert!(matches!(
            &tokens[2],
            Token::Record {
                section: Some(SectionKind::Torquecurve),
                ..
            }
        ));
    }

    #[test]
    fn test_keyword_round_trip() {
        for (name, kind) in SECTIONS {
            assert_eq!(SectionKind::from_keyword(name), Some(*kind));
            assert_eq!(kind.keyword(), *name);
        }
    }
}
