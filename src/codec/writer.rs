//! [PageWriter]: the model tree back to LDraw source.
//!
//! Output is canonical rather than byte-identical: numbers use the shortest form that parses
//! back to the same value, header properties come out in a fixed order, and geometry inside a
//! `!TEXMAP START` block is always written with the `0 !:` prefix. Deactivated comments are
//! written verbatim, so parsing the output yields the same tree.

use crate::model::{
    BfcCertification, BfcCommand, Comment, CommentKind, Document, Element, ElementFlag,
    ElementFlags, MetaCommand, Page, PageHeader, PageType, Projection, ReleaseStatus,
    StepRotation, TexMap, TexMapForm, Vertex, Winding,
};

pub struct PageWriter;

impl PageWriter {
    /// One page, without a `FILE` line.
    pub fn write_page(page: &Page) -> String {
        let mut out = Output::default();
        out.page(page);
        out.finish()
    }

    /// A whole document. Multi-part documents get a `0 FILE` line before every page.
    pub fn write_document(document: &Document) -> String {
        let mut out = Output::default();
        let multi_part = document.pages().len() > 1;
        for page in document.pages() {
            if multi_part {
                out.line(format!("0 FILE {}", page.target_name()));
            }
            out.page(page);
        }
        out.finish()
    }
}

#[derive(Default)]
struct Output {
    lines: Vec<String>,
}

impl Output {
    fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    fn page(&mut self, page: &Page) {
        self.header(&page.header());
        let steps = page.steps();
        for (i, step) in steps.iter().enumerate() {
            for element in step.elements.iter() {
                self.element(element, false);
            }
            match step.rotation {
                Some(rotation) => self.line(rotstep(rotation)),
                None if i + 1 < steps.len() => self.line("0 STEP"),
                None => {}
            }
        }
    }

    fn header(&mut self, header: &PageHeader) {
        if let Some(title) = header.title.as_deref() {
            self.line(format!("0 {title}"));
        }
        // Always present: it closes title detection even for untitled pages.
        self.line(format!("0 Name: {}", header.target_name()));
        if let Some(author) = header.author.as_deref() {
            self.line(format!("0 Author: {author}"));
        }
        if header.type_declared {
            self.line(format!(
                "0 !LDRAW_ORG {}",
                type_line(header.page_type, &header.status)
            ));
        }
        if let Some(license) = header.license.as_deref() {
            self.line(format!("0 !LICENSE {license}"));
        }
        for help in header.help.iter() {
            self.line(format!("0 !HELP {help}").trim_end().to_string());
        }
        match header.bfc {
            BfcCertification::Unknown => {}
            BfcCertification::Certified(winding) => {
                self.line(format!("0 BFC CERTIFY {}", winding_name(winding)))
            }
            BfcCertification::NotCertified => self.line("0 BFC NOCERTIFY"),
        }
        if let Some(category) = header.category.as_deref() {
            self.line(format!("0 !CATEGORY {category}"));
        }
        if !header.keywords.is_empty() {
            self.line(format!("0 !KEYWORDS {}", header.keywords.join(", ")));
        }
        if let Some(cmdline) = header.cmdline.as_deref() {
            self.line(format!("0 !CMDLINE {cmdline}"));
        }
        if let Some(theme) = header.theme.as_deref() {
            self.line(format!("0 !THEME {theme}"));
        }
        for entry in header.history.iter() {
            let line = format!(
                "0 !HISTORY {} {} {}",
                entry.date,
                entry.bracketed_author(),
                entry.text
            );
            self.line(line.trim_end().to_string());
        }
    }

    /// `textured`: inside a `!TEXMAP START` block, where geometry takes the `0 !:` prefix.
    fn element(&mut self, element: &Element, textured: bool) {
        match element {
            Element::Comment(comment) => self.line(comment_line(comment)),
            Element::Meta(command) => self.line(meta_line(command)),
            Element::Group(group) => {
                self.line(format!("0 !LEOCAD GROUP BEGIN {}", group.name));
                for element in group.elements.iter() {
                    self.element(element, textured);
                }
                self.line("0 !LEOCAD GROUP END");
            }
            Element::TexMap(texmap) => self.texmap(texmap),
            geometry => {
                let Some((flags, inverted, line)) = geometry_line(geometry) else {
                    return;
                };
                for flag in flags.iter() {
                    self.line(modifier_line(flag));
                }
                if inverted {
                    self.line("0 BFC INVERTNEXT");
                }
                if textured {
                    self.line(format!("0 !: {line}"));
                } else {
                    self.line(line);
                }
            }
        }
    }

    fn texmap(&mut self, texmap: &TexMap) {
        let form = match texmap.form {
            TexMapForm::Block => "START",
            TexMapForm::Next => "NEXT",
        };
        let mut line = format!("0 !TEXMAP {form} {}", projection(&texmap.projection));
        line.push(' ');
        line.push_str(&file_name(&texmap.texture));
        if let Some(gloss) = texmap.glossmap.as_deref() {
            line.push_str(" GLOSSMAP ");
            line.push_str(&file_name(gloss));
        }
        self.line(line);

        let block = texmap.form == TexMapForm::Block;
        for element in texmap.textured.iter() {
            self.element(element, block);
        }
        if block {
            if !texmap.fallback.is_empty() {
                self.line("0 !TEXMAP FALLBACK");
                for element in texmap.fallback.iter() {
                    self.element(element, false);
                }
            }
            self.line("0 !TEXMAP END");
        }
    }
}

fn type_line(page_type: PageType, status: &ReleaseStatus) -> String {
    match status {
        ReleaseStatus::Uncertified => format!("Unofficial_{}", page_type.as_str()),
        ReleaseStatus::Released {
            update: Some(update),
        } => format!("{} UPDATE {update}", page_type.as_str()),
        _ => page_type.as_str().to_string(),
    }
}

fn winding_name(winding: Winding) -> &'static str {
    match winding {
        Winding::Ccw => "CCW",
        Winding::Cw => "CW",
    }
}

fn comment_line(comment: &Comment) -> String {
    match &comment.kind {
        CommentKind::Deactivated { .. } => comment.text.clone(),
        CommentKind::Plain if comment.text.trim().is_empty() => "0".to_string(),
        CommentKind::Plain => format!("0 {}", comment.text),
    }
}

fn meta_line(command: &MetaCommand) -> String {
    match command {
        MetaCommand::Bfc(BfcCommand::Winding(winding)) => {
            format!("0 BFC {}", winding_name(*winding))
        }
        MetaCommand::Bfc(BfcCommand::Clip(None)) => "0 BFC CLIP".to_string(),
        MetaCommand::Bfc(BfcCommand::Clip(Some(winding))) => {
            format!("0 BFC CLIP {}", winding_name(*winding))
        }
        MetaCommand::Bfc(BfcCommand::NoClip) => "0 BFC NOCLIP".to_string(),
        MetaCommand::Clear => "0 CLEAR".to_string(),
        MetaCommand::Pause => "0 PAUSE".to_string(),
        MetaCommand::Save => "0 SAVE".to_string(),
        MetaCommand::Write(message) => format!("0 WRITE {message}"),
    }
}

fn modifier_line(flag: ElementFlag) -> &'static str {
    match flag {
        ElementFlag::Locked => "0 !LOCKNEXT",
        ElementFlag::Ghosted => "0 !GHOSTNEXT",
        ElementFlag::Hidden => "0 !HIDENEXT",
    }
}

fn rotstep(rotation: StepRotation) -> String {
    let (v, mode) = match rotation {
        StepRotation::End => return "0 ROTSTEP END".to_string(),
        StepRotation::Relative(v) => (v, "REL"),
        StepRotation::Absolute(v) => (v, "ABS"),
        StepRotation::Additive(v) => (v, "ADD"),
    };
    format!("0 ROTSTEP {} {mode}", vertex(&v))
}

/// The geometry line of an element, with the modifiers that precede it.
fn geometry_line(element: &Element) -> Option<(ElementFlags, bool, String)> {
    let written = match element {
        Element::Reference(r) => {
            let m = &r.transform.matrix;
            let matrix: Vec<String> = m.iter().flatten().map(|n| number(*n)).collect();
            let line = format!(
                "1 {} {} {} {}",
                r.colour,
                vertex(&r.transform.origin),
                matrix.join(" "),
                r.target_name()
            );
            (r.flags, r.inverted, line)
        }
        Element::Line(l) => (l.flags, false, format!("2 {} {}", l.colour, vertices(&l.vertices))),
        Element::Triangle(t) => {
            (t.flags, false, format!("3 {} {}", t.colour, vertices(&t.vertices)))
        }
        Element::Quad(q) => (q.flags, false, format!("4 {} {}", q.colour, vertices(&q.vertices))),
        Element::OptionalLine(o) => (
            o.flags,
            false,
            format!(
                "5 {} {} {}",
                o.colour,
                vertices(&o.vertices),
                vertices(&o.controls)
            ),
        ),
        _ => return None,
    };
    Some(written)
}

fn projection(projection: &Projection) -> String {
    match projection {
        Projection::Planar { points } => format!("PLANAR {}", vertices(points)),
        Projection::Cylindrical { points, angle } => {
            format!("CYLINDRICAL {} {}", vertices(points), number(*angle))
        }
        Projection::Spherical { points, angles } => format!(
            "SPHERICAL {} {} {}",
            vertices(points),
            number(angles[0]),
            number(angles[1])
        ),
    }
}

fn file_name(name: &str) -> String {
    if name.contains(char::is_whitespace) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

fn vertices(vs: &[Vertex]) -> String {
    vs.iter().map(vertex).collect::<Vec<_>>().join(" ")
}

fn vertex(v: &Vertex) -> String {
    format!("{} {} {}", number(v.x), number(v.y), number(v.z))
}

/// Shortest round-tripping form, without a negative zero.
fn number(n: f64) -> String {
    if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}
