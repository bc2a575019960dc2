//! Step elements: comments, meta-commands, geometry, groups and texture-mapping blocks.

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::model::reference::Reference;

/// An LDraw colour: either a palette code or a direct `0x2RRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Colour {
    Code(u32),
    Direct(u32),
}

impl Colour {
    /// Colour 16, inherited from the referencing element.
    pub const MAIN: Colour = Colour::Code(16);
    /// Colour 24, the complement edge colour.
    pub const EDGE: Colour = Colour::Code(24);
}

impl Default for Colour {
    fn default() -> Self {
        Colour::MAIN
    }
}

impl FromStr for Colour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .or_else(|| s.strip_prefix('#'));
        match hex {
            Some(digits) => {
                let rgb = digits
                    .strip_prefix('2')
                    .filter(|rgb| rgb.len() == 6)
                    .ok_or_else(|| format!("direct colour '{s}' must have the form 0x2RRGGBB"))?;
                u32::from_str_radix(rgb, 16)
                    .map(Colour::Direct)
                    .map_err(|e| format!("invalid direct colour '{s}': {e}"))
            }
            None => s
                .parse::<u32>()
                .map(Colour::Code)
                .map_err(|e| format!("invalid colour '{s}': {e}")),
        }
    }
}

impl Display for Colour {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Colour::Code(code) => write!(f, "{code}"),
            Colour::Direct(rgb) => write!(f, "0x2{rgb:06X}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vertex { x, y, z }
    }
}

impl From<[f64; 3]> for Vertex {
    fn from(v: [f64; 3]) -> Self {
        Vertex::new(v[0], v[1], v[2])
    }
}

/// Position plus row-major 3x3 matrix, in the field order of a type-1 line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub origin: Vertex,
    pub matrix: [[f64; 3]; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            origin: Vertex::default(),
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl From<[f64; 12]> for Transform {
    fn from(f: [f64; 12]) -> Self {
        Transform {
            origin: Vertex::new(f[0], f[1], f[2]),
            matrix: [[f[3], f[4], f[5]], [f[6], f[7], f[8]], [f[9], f[10], f[11]]],
        }
    }
}

/// Editor state attached to a geometry line by the preceding `!LOCKNEXT`, `!GHOSTNEXT` or
/// `!HIDENEXT` modifier.
#[derive(EnumSetType, Debug, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum ElementFlag {
    Locked,
    Ghosted,
    Hidden,
}

pub type ElementFlags = EnumSet<ElementFlag>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentKind {
    Plain,
    /// A line that looked like a recognised construct but was rejected. The text is the original
    /// line, verbatim.
    Deactivated { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub kind: CommentKind,
}

impl Comment {
    pub fn plain(text: impl Into<String>) -> Self {
        Comment {
            text: text.into(),
            kind: CommentKind::Plain,
        }
    }

    pub fn deactivated(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Comment {
            text: line.into(),
            kind: CommentKind::Deactivated {
                reason: reason.into(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind == CommentKind::Plain && self.text.trim().is_empty()
    }

    pub fn is_deactivated(&self) -> bool {
        matches!(self.kind, CommentKind::Deactivated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winding {
    Ccw,
    Cw,
}

/// Body `BFC` statements. Certification lives in the page header and INVERTNEXT is folded into
/// the following reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BfcCommand {
    Winding(Winding),
    Clip(Option<Winding>),
    NoClip,
}

/// Recognised meta-commands that survive as elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCommand {
    Bfc(BfcCommand),
    Clear,
    Pause,
    Save,
    /// `WRITE` / `PRINT` message
    Write(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub colour: Colour,
    pub vertices: [Vertex; 2],
    pub flags: ElementFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub colour: Colour,
    pub vertices: [Vertex; 3],
    pub flags: ElementFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub colour: Colour,
    pub vertices: [Vertex; 4],
    pub flags: ElementFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalLine {
    pub colour: Colour,
    pub vertices: [Vertex; 2],
    pub controls: [Vertex; 2],
    pub flags: ElementFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Planar {
        points: [Vertex; 3],
    },
    Cylindrical {
        points: [Vertex; 3],
        angle: f64,
    },
    Spherical {
        points: [Vertex; 3],
        angles: [f64; 2],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TexMapForm {
    /// `START` ... `END`
    Block,
    /// `NEXT`: exactly one textured element
    Next,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TexMap {
    pub projection: Projection,
    pub texture: String,
    pub glossmap: Option<String>,
    pub form: TexMapForm,
    /// Geometry drawn with the texture, including `0 !:` lines.
    pub textured: Vec<Element>,
    /// Geometry used by renderers without texture support.
    pub fallback: Vec<Element>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Element {
    Comment(Comment),
    Meta(MetaCommand),
    Reference(Reference),
    Line(Line),
    Triangle(Triangle),
    Quad(Quad),
    OptionalLine(OptionalLine),
    Group(Group),
    TexMap(TexMap),
}

impl Element {
    /// Short name reported through the progress callback.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Comment(_) => "comment",
            Element::Meta(_) => "meta",
            Element::Reference(_) => "reference",
            Element::Line(_) => "line",
            Element::Triangle(_) => "triangle",
            Element::Quad(_) => "quad",
            Element::OptionalLine(_) => "optional-line",
            Element::Group(_) => "group",
            Element::TexMap(_) => "texmap",
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            Element::Reference(_)
                | Element::Line(_)
                | Element::Triangle(_)
                | Element::Quad(_)
                | Element::OptionalLine(_)
        )
    }

    pub fn as_comment(&self) -> Option<&Comment> {
        match self {
            Element::Comment(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Element::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn flags_mut(&mut self) -> Option<&mut ElementFlags> {
        match self {
            Element::Reference(r) => Some(&mut r.flags),
            Element::Line(l) => Some(&mut l.flags),
            Element::Triangle(t) => Some(&mut t.flags),
            Element::Quad(q) => Some(&mut q.flags),
            Element::OptionalLine(o) => Some(&mut o.flags),
            _ => None,
        }
    }

    /// Depth-first visit of every reference, descending into groups and texture blocks.
    pub fn for_each_reference<'a>(&'a self, f: &mut dyn FnMut(&'a Reference)) {
        match self {
            Element::Reference(r) => f(r),
            Element::Group(group) => {
                for element in group.elements.iter() {
                    element.for_each_reference(f);
                }
            }
            Element::TexMap(texmap) => {
                for element in texmap.textured.iter().chain(texmap.fallback.iter()) {
                    element.for_each_reference(f);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours() {
        assert_eq!("16".parse::<Colour>(), Ok(Colour::MAIN));
        assert_eq!("0x2FF0000".parse::<Colour>(), Ok(Colour::Direct(0xFF0000)));
        assert_eq!("#2ff0000".parse::<Colour>(), Ok(Colour::Direct(0xFF0000)));
        assert!("0x3FF0000".parse::<Colour>().is_err());
        assert!("red".parse::<Colour>().is_err());
        assert_eq!(Colour::Direct(0x00FF00).to_string(), "0x200FF00");
    }
}
