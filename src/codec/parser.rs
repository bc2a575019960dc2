//! [PageParser]: one page of LDraw source into a [Page] tree.
//!
//! The parser is a single forward pass over lines. Header properties are folded into the
//! [PageHeader]; everything else becomes an element of the current step, group or texture block.
//! Lines that look like recognised constructs but cannot be used are kept verbatim as deactivated
//! comments so a page always round-trips. Only malformed geometry and numeric arguments of
//! `ROTSTEP`/`!TEXMAP` abort the parse.

use std::collections::HashSet;

use crate::{
    codec::{
        diagnostic::ParseDiagnostic,
        header::{self, HeaderLine},
        line::{rest_from, tokenize, LineCursor, SourceLine, Token},
        meta::{self, MetaLine, TexMapLine},
        ProgressFn,
    },
    error::LDrawError,
    model::{
        page_type::{extension_of, stem_of},
        Colour, Comment, Element, ElementFlag, ElementFlags, Group, Line, MetaCommand,
        OptionalLine, Page, PageHeader, PageType, Projection, Quad, Reference, Step,
        StepRotation, TexMap, TexMapForm, Transform, Triangle, Vertex,
    },
};

/// Parses a single page. See [crate::codec::DocumentParser] for whole files.
pub struct PageParser;

impl PageParser {
    /// Parse the first page of `source`.
    ///
    /// `document_path` is only used in error messages. `declared_file_path` names the page when
    /// it carries no `FILE` line and drives page-type inference when it declares no type.
    pub fn parse(
        source: &str,
        document_path: &str,
        declared_file_path: Option<&str>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Page, LDrawError> {
        let mut cursor = LineCursor::new(source);
        Self::parse_next(&mut cursor, document_path, declared_file_path, progress)
    }

    /// Parse the page starting at the cursor. Stops before a following `FILE` line, after a
    /// `NOFILE` line, or at end of input.
    pub(crate) fn parse_next(
        cursor: &mut LineCursor<'_>,
        document_path: &str,
        declared_file_path: Option<&str>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Page, LDrawError> {
        let mut declared = declared_file_path.map(str::to_string);
        let mut by_file = false;
        if let Some(line) = cursor.peek() {
            if let Some(name) = file_line(line.text) {
                declared = Some(name.to_string());
                by_file = true;
                cursor.advance();
            }
        }

        let mut builder = PageBuilder::new(declared.as_deref(), by_file, document_path, progress);
        while let Some(line) = cursor.peek() {
            if file_line(line.text).is_some() {
                break;
            }
            cursor.advance();
            let percent = cursor.progress(50);
            if builder.line(line, percent)? == Flow::EndOfPage {
                break;
            }
        }
        builder.finish(cursor.progress(50))
    }
}

/// The file name of a `0 FILE name` line.
pub(crate) fn file_line(text: &str) -> Option<&str> {
    let tokens = tokenize(text);
    match tokens.as_slice() {
        [zero, file, ..] if zero.text == "0" && file.text == "FILE" => {
            let name = rest_from(text, &tokens, 2);
            (!name.is_empty()).then_some(name)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    EndOfPage,
}

/// A `*NEXT` modifier waiting for its geometry line. `flag == None` is `BFC INVERTNEXT`.
#[derive(Debug)]
struct PendingModifier {
    flag: Option<ElementFlag>,
    line_number: usize,
    text: String,
}

#[derive(Debug)]
struct OpenTexMap {
    line_number: usize,
    texmap: TexMap,
    in_fallback: bool,
}

#[derive(Debug)]
struct OpenGroup {
    line_number: usize,
    group: Group,
}

/// Why texture arguments could not be used.
enum ArgError {
    /// Numeric or field-count problem: fatal.
    Syntax(String),
    /// Unknown keyword: the line is deactivated.
    Unusable(String),
}

struct PageBuilder<'a, 'p> {
    path: &'a str,
    progress: &'a mut ProgressFn<'p>,
    header: PageHeader,
    by_file: bool,
    header_open: bool,
    accepted: HashSet<&'static str>,
    title_decided: bool,
    steps: Vec<Step>,
    current: Step,
    groups: Vec<OpenGroup>,
    texmap: Option<OpenTexMap>,
    pending: Vec<PendingModifier>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl<'a, 'p> PageBuilder<'a, 'p> {
    fn new(
        declared: Option<&str>,
        by_file: bool,
        path: &'a str,
        progress: &'a mut ProgressFn<'p>,
    ) -> Self {
        let (name, page_type, model_extension) = match declared {
            Some(declared) => {
                let page_type = PageType::infer_from_path(declared);
                let extension = model_extension(page_type, declared);
                (stem_of(declared), page_type, extension)
            }
            None => ("untitled".to_string(), PageType::Model, None),
        };
        let mut header = PageHeader::new(name, page_type);
        header.model_extension = model_extension;
        PageBuilder {
            path,
            progress,
            header,
            by_file,
            header_open: true,
            accepted: HashSet::new(),
            title_decided: false,
            steps: Vec::new(),
            current: Step::default(),
            groups: Vec::new(),
            texmap: None,
            pending: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn syntax(&self, line: SourceLine<'_>, message: impl Into<String>) -> LDrawError {
        LDrawError::syntax(self.path, line.text, line.number, message)
    }

    fn line(&mut self, line: SourceLine<'_>, percent: u8) -> Result<Flow, LDrawError> {
        let tokens = tokenize(line.text);
        let Some(kind) = tokens.first().map(|t| t.text) else {
            self.emit(Element::Comment(Comment::plain("")), percent)?;
            return Ok(Flow::Continue);
        };
        match kind {
            "0" => self.zero_line(line, &tokens, percent),
            "1" | "2" | "3" | "4" | "5" => {
                self.header_open = false;
                self.title_decided = true;
                let element =
                    geometry(line.text, &tokens).map_err(|message| self.syntax(line, message))?;
                self.geometry(element, line, percent)?;
                Ok(Flow::Continue)
            }
            other => {
                self.title_decided = true;
                let reason = format!("unrecognised line type '{other}'");
                self.deactivate(line, reason, percent)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn zero_line(
        &mut self,
        line: SourceLine<'_>,
        tokens: &[Token<'_>],
        percent: u8,
    ) -> Result<Flow, LDrawError> {
        let body = rest_from(line.text, tokens, 1);
        if body.is_empty() {
            self.emit(Element::Comment(Comment::plain("")), percent)?;
            return Ok(Flow::Continue);
        }

        if let Some(property) = header::classify(body) {
            self.title_decided = true;
            match property {
                Ok(property) => self.header_property(property, line, percent)?,
                Err(reason) => self.deactivate(line, reason, percent)?,
            }
            return Ok(Flow::Continue);
        }

        let Some(meta) = meta::classify(body) else {
            if !self.title_decided {
                self.title_decided = true;
                self.header.title = Some(body.to_string());
                return Ok(Flow::Continue);
            }
            self.emit(Element::Comment(Comment::plain(body)), percent)?;
            return Ok(Flow::Continue);
        };

        self.title_decided = true;
        match meta {
            MetaLine::NoFile => return Ok(Flow::EndOfPage),
            MetaLine::Step => self.close_step(None),
            MetaLine::RotStep(args) => {
                let rotation = rotation(args).map_err(|message| self.syntax(line, message))?;
                self.close_step(Some(rotation));
            }
            MetaLine::Bfc(command) => {
                self.emit(Element::Meta(MetaCommand::Bfc(command)), percent)?
            }
            MetaLine::InvertNext => self.modifier(None, line, percent)?,
            MetaLine::Modifier(flag) => self.modifier(Some(flag), line, percent)?,
            MetaLine::GroupBegin(name) => {
                if self.texmap.is_some() {
                    self.deactivate(line, "group marker inside a texture block", percent)?;
                } else {
                    self.groups.push(OpenGroup {
                        line_number: line.number,
                        group: Group {
                            name: name.to_string(),
                            elements: Vec::new(),
                        },
                    });
                }
            }
            MetaLine::GroupEnd => {
                if self.texmap.is_some() {
                    self.deactivate(line, "group marker inside a texture block", percent)?;
                } else if let Some(open) = self.groups.pop() {
                    self.emit(Element::Group(open.group), percent)?;
                } else {
                    self.deactivate(line, "GROUP END without an open group", percent)?;
                }
            }
            MetaLine::TexMap(texmap) => self.texmap_line(texmap, line, percent)?,
            MetaLine::Textured(inner) => self.textured(inner, line, percent)?,
            MetaLine::Legacy(command) => self.emit(Element::Meta(command), percent)?,
            MetaLine::Malformed(reason) => self.deactivate(line, reason, percent)?,
        }
        Ok(Flow::Continue)
    }

    fn header_property(
        &mut self,
        property: HeaderLine,
        line: SourceLine<'_>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        let label = property.label();
        if !self.header_open {
            return self.deactivate(line, format!("{label} after the header"), percent);
        }
        if !property.allowed_for(self.header.page_type) {
            let reason = format!("{label} not allowed on {} pages", self.header.page_type);
            return self.deactivate(line, reason, percent);
        }
        if let Some(key) = property.once_key() {
            if !self.accepted.insert(key) {
                return self.deactivate(line, format!("duplicate {label}"), percent);
            }
        }

        let header = &mut self.header;
        match property {
            HeaderLine::Name(name) => {
                if !self.by_file {
                    header.name = stem_of(&name);
                }
            }
            HeaderLine::Author(author) => header.author = Some(author),
            HeaderLine::Type(page_type, status) => {
                header.page_type = page_type;
                header.type_declared = true;
                header.status = status;
                if page_type != PageType::Model {
                    header.model_extension = None;
                }
            }
            HeaderLine::License(license) => header.license = Some(license),
            HeaderLine::Theme(theme) => header.theme = Some(theme),
            HeaderLine::Category(category) => header.category = Some(category),
            HeaderLine::Keywords(keywords) => header.keywords.extend(keywords),
            HeaderLine::History(entry) => header.history.push(entry),
            HeaderLine::Help(help) => header.help.push(help),
            HeaderLine::CmdLine(cmdline) => header.cmdline = Some(cmdline),
            HeaderLine::Certify(bfc) => header.bfc = bfc,
        }
        Ok(())
    }

    fn modifier(
        &mut self,
        flag: Option<ElementFlag>,
        line: SourceLine<'_>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        if self.pending.iter().any(|p| p.flag == flag) {
            return self.deactivate(line, "modifier already pending", percent);
        }
        self.pending.push(PendingModifier {
            flag,
            line_number: line.number,
            text: line.text.to_string(),
        });
        Ok(())
    }

    /// Apply pending modifiers and place a geometry element.
    fn geometry(
        &mut self,
        mut element: Element,
        line: SourceLine<'_>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        let mut flags = ElementFlags::empty();
        let mut stray_invert = None;
        for pending in std::mem::take(&mut self.pending) {
            match pending.flag {
                Some(flag) => {
                    flags.insert(flag);
                }
                None => stray_invert = Some(pending),
            }
        }
        if let Some(f) = element.flags_mut() {
            *f |= flags;
        }
        if let Some(invert) = stray_invert {
            match element {
                Element::Reference(ref mut reference) => reference.inverted = true,
                _ => {
                    self.diagnostics.push(ParseDiagnostic::warning(
                        invert.line_number,
                        format!(
                            "INVERTNEXT followed by a {} on line {}",
                            element.kind_name(),
                            line.number
                        ),
                    ));
                    self.emit(
                        Element::Comment(Comment::deactivated(
                            invert.text,
                            "INVERTNEXT only applies to references",
                        )),
                        percent,
                    )?;
                }
            }
        }
        self.emit(element, percent)?;

        let next_form = matches!(
            self.texmap,
            Some(OpenTexMap {
                texmap: TexMap {
                    form: TexMapForm::Next,
                    ..
                },
                ..
            })
        );
        if next_form {
            self.close_texmap(percent)?;
        }
        Ok(())
    }

    fn textured(
        &mut self,
        inner: &str,
        line: SourceLine<'_>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        let usable = matches!(&self.texmap, Some(open) if !open.in_fallback);
        if !usable {
            return self.deactivate(line, "textured geometry outside a texture block", percent);
        }
        let tokens = tokenize(inner);
        match tokens.first().map(|t| t.text) {
            Some("1" | "2" | "3" | "4" | "5") => {
                let element =
                    geometry(inner, &tokens).map_err(|message| self.syntax(line, message))?;
                self.geometry(element, line, percent)
            }
            _ => self.deactivate(line, "textured line is not geometry", percent),
        }
    }

    fn texmap_line(
        &mut self,
        texmap: TexMapLine<'_>,
        line: SourceLine<'_>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        match texmap {
            TexMapLine::Start(args) | TexMapLine::Next(args) => {
                if self.texmap.is_some() {
                    return self.deactivate(line, "nested texture block", percent);
                }
                let form = match texmap {
                    TexMapLine::Next(_) => TexMapForm::Next,
                    _ => TexMapForm::Block,
                };
                match texmap_args(args) {
                    Ok((projection, texture, glossmap)) => {
                        self.texmap = Some(OpenTexMap {
                            line_number: line.number,
                            texmap: TexMap {
                                projection,
                                texture,
                                glossmap,
                                form,
                                textured: Vec::new(),
                                fallback: Vec::new(),
                            },
                            in_fallback: false,
                        });
                        Ok(())
                    }
                    Err(ArgError::Syntax(message)) => Err(self.syntax(line, message)),
                    Err(ArgError::Unusable(reason)) => self.deactivate(line, reason, percent),
                }
            }
            TexMapLine::Fallback => match self.texmap.as_mut() {
                Some(open) if open.texmap.form == TexMapForm::Block && !open.in_fallback => {
                    open.in_fallback = true;
                    Ok(())
                }
                _ => self.deactivate(line, "FALLBACK outside a texture block", percent),
            },
            TexMapLine::End => match &self.texmap {
                Some(open) if open.texmap.form == TexMapForm::Block => self.close_texmap(percent),
                _ => self.deactivate(line, "END without a texture block", percent),
            },
        }
    }

    fn close_texmap(&mut self, percent: u8) -> Result<(), LDrawError> {
        match self.texmap.take() {
            Some(open) => self.emit(Element::TexMap(open.texmap), percent),
            None => Ok(()),
        }
    }

    /// `STEP` / `ROTSTEP`: the rotation belongs to the step being closed.
    fn close_step(&mut self, rotation: Option<StepRotation>) {
        let mut step = std::mem::take(&mut self.current);
        step.rotation = rotation;
        self.steps.push(step);
    }

    fn deactivate(
        &mut self,
        line: SourceLine<'_>,
        reason: impl Into<String>,
        percent: u8,
    ) -> Result<(), LDrawError> {
        let reason = reason.into();
        tracing::debug!(
            "{}:{}: deactivated '{}': {reason}",
            self.path,
            line.number,
            line.text
        );
        self.diagnostics
            .push(ParseDiagnostic::deactivated(line.number, reason.clone()));
        self.emit(
            Element::Comment(Comment::deactivated(line.text, reason)),
            percent,
        )
    }

    /// Place an element in the innermost open container and report progress.
    fn emit(&mut self, element: Element, percent: u8) -> Result<(), LDrawError> {
        let kind = element.kind_name();
        if let Some(open) = self.texmap.as_mut() {
            if open.in_fallback {
                open.texmap.fallback.push(element);
            } else {
                open.texmap.textured.push(element);
            }
        } else if let Some(open) = self.groups.last_mut() {
            open.group.elements.push(element);
        } else {
            self.current.elements.push(element);
        }
        if (self.progress)(kind, percent) {
            Ok(())
        } else {
            Err(LDrawError::OperationCancelled)
        }
    }

    fn finish(mut self, percent: u8) -> Result<Page, LDrawError> {
        if let Some(open) = self.texmap.as_ref() {
            self.diagnostics.push(ParseDiagnostic::warning(
                open.line_number,
                "texture block not closed before the end of the page",
            ));
            self.close_texmap(percent)?;
        }

        for pending in std::mem::take(&mut self.pending) {
            self.diagnostics.push(ParseDiagnostic::deactivated(
                pending.line_number,
                "modifier pending at the end of the page",
            ));
            self.emit(
                Element::Comment(Comment::deactivated(
                    pending.text,
                    "modifier pending at the end of the page",
                )),
                percent,
            )?;
        }

        while let Some(open) = self.groups.pop() {
            self.diagnostics.push(ParseDiagnostic::warning(
                open.line_number,
                format!(
                    "group '{}' not closed, attached to the last step",
                    open.group.name
                ),
            ));
            self.emit(Element::Group(open.group), percent)?;
        }

        trim_trailing_empty(&mut self.current);
        if !self.current.is_empty() || self.steps.is_empty() {
            let step = std::mem::take(&mut self.current);
            self.steps.push(step);
        }
        if let Some(last) = self.steps.last_mut() {
            trim_trailing_empty(last);
        }

        Ok(Page::new(self.header, self.steps).with_diagnostics(self.diagnostics))
    }
}

fn model_extension(page_type: PageType, declared: &str) -> Option<String> {
    if page_type != PageType::Model {
        return None;
    }
    extension_of(declared).filter(|ext| ext != "ldr")
}

fn trim_trailing_empty(step: &mut Step) {
    while matches!(step.elements.last(), Some(Element::Comment(c)) if c.is_empty()) {
        step.elements.pop();
    }
}

fn number(token: &Token<'_>) -> Result<f64, String> {
    token
        .text
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", token.text))
}

fn numbers<const N: usize>(tokens: &[Token<'_>]) -> Result<[f64; N], String> {
    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(tokens.iter()) {
        *value = number(token)?;
    }
    Ok(values)
}

fn vertices<const N: usize>(tokens: &[Token<'_>]) -> Result<[Vertex; N], String> {
    let mut result = [Vertex::default(); N];
    for (vertex, chunk) in result.iter_mut().zip(tokens.chunks(3)) {
        *vertex = Vertex::from(numbers::<3>(chunk)?);
    }
    Ok(result)
}

/// Parse a type 1-5 line. Errors are field-count or field-type violations.
pub(crate) fn geometry(text: &str, tokens: &[Token<'_>]) -> Result<Element, String> {
    let kind = tokens.first().map(|t| t.text).unwrap_or_default();
    let expected = match kind {
        "1" => 15,
        "2" => 8,
        "3" => 11,
        "4" | "5" => 14,
        other => return Err(format!("'{other}' is not a geometry line type")),
    };
    let count_ok = match kind {
        "1" => tokens.len() >= expected,
        _ => tokens.len() == expected,
    };
    if !count_ok {
        return Err(format!(
            "line type {kind} expects {}{expected} fields, found {}",
            if kind == "1" { "at least " } else { "" },
            tokens.len()
        ));
    }
    let colour: Colour = tokens[1].text.parse()?;
    let fields = &tokens[2..];
    let element = match kind {
        "1" => {
            let transform = Transform::from(numbers::<12>(&fields[..12])?);
            Element::Reference(Reference::new(
                rest_from(text, tokens, 14),
                colour,
                transform,
            ))
        }
        "2" => Element::Line(Line {
            colour,
            vertices: vertices::<2>(fields)?,
            flags: ElementFlags::empty(),
        }),
        "3" => Element::Triangle(Triangle {
            colour,
            vertices: vertices::<3>(fields)?,
            flags: ElementFlags::empty(),
        }),
        "4" => Element::Quad(Quad {
            colour,
            vertices: vertices::<4>(fields)?,
            flags: ElementFlags::empty(),
        }),
        _ => Element::OptionalLine(OptionalLine {
            colour,
            vertices: vertices::<2>(&fields[..6])?,
            controls: vertices::<2>(&fields[6..])?,
            flags: ElementFlags::empty(),
        }),
    };
    Ok(element)
}

fn rotation(args: &str) -> Result<StepRotation, String> {
    let tokens = tokenize(args);
    match tokens.as_slice() {
        [end] if end.text == "END" => Ok(StepRotation::End),
        [x, y, z] => Ok(StepRotation::Relative(Vertex::from(numbers::<3>(&[*x, *y, *z])?))),
        [x, y, z, mode] => {
            let v = Vertex::from(numbers::<3>(&[*x, *y, *z])?);
            match mode.text {
                "REL" => Ok(StepRotation::Relative(v)),
                "ABS" => Ok(StepRotation::Absolute(v)),
                "ADD" => Ok(StepRotation::Additive(v)),
                other => Err(format!("unknown ROTSTEP mode '{other}'")),
            }
        }
        _ => Err(format!(
            "ROTSTEP expects 'x y z [REL|ABS|ADD]' or 'END', found {} fields",
            tokens.len()
        )),
    }
}

/// Split off one file name, honouring double quotes for names with spaces.
fn file_name(rest: &str) -> Option<(String, &str)> {
    let rest = rest.trim_start();
    if let Some(quoted) = rest.strip_prefix('"') {
        let end = quoted.find('"')?;
        return Some((quoted[..end].to_string(), &quoted[end + 1..]));
    }
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some((rest[..end].to_string(), &rest[end..]))
}

fn texmap_args(args: &str) -> Result<(Projection, String, Option<String>), ArgError> {
    let tokens = tokenize(args);
    let Some(method) = tokens.first() else {
        return Err(ArgError::Syntax("texture projection missing".to_string()));
    };
    let extra = match method.text {
        "PLANAR" => 0,
        "CYLINDRICAL" => 1,
        "SPHERICAL" => 2,
        other => {
            return Err(ArgError::Unusable(format!(
                "unknown texture projection '{other}'"
            )))
        }
    };
    let needed = 1 + 9 + extra;
    if tokens.len() < needed + 1 {
        return Err(ArgError::Syntax(format!(
            "{} projection expects {} numbers and a texture",
            method.text,
            9 + extra
        )));
    }
    let points = vertices::<3>(&tokens[1..10]).map_err(ArgError::Syntax)?;
    let projection = match extra {
        0 => Projection::Planar { points },
        1 => Projection::Cylindrical {
            points,
            angle: number(&tokens[10]).map_err(ArgError::Syntax)?,
        },
        _ => Projection::Spherical {
            points,
            angles: numbers::<2>(&tokens[10..12]).map_err(ArgError::Syntax)?,
        },
    };

    let rest = &args[tokens[needed].start..];
    let (texture, rest) = file_name(rest)
        .ok_or_else(|| ArgError::Syntax("unterminated texture file name".to_string()))?;
    let rest = rest.trim();
    let glossmap = if rest.is_empty() {
        None
    } else {
        let Some(gloss) = rest.strip_prefix("GLOSSMAP") else {
            return Err(ArgError::Syntax(format!(
                "unexpected text after texture name: '{rest}'"
            )));
        };
        let (gloss, tail) = file_name(gloss)
            .ok_or_else(|| ArgError::Syntax("GLOSSMAP without a file name".to_string()))?;
        if !tail.trim().is_empty() {
            return Err(ArgError::Syntax(format!(
                "unexpected text after glossmap name: '{}'",
                tail.trim()
            )));
        }
        Some(gloss)
    };
    Ok((projection, texture, glossmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommentKind;

    fn parse(source: &str, path: &str) -> Result<Page, LDrawError> {
        PageParser::parse(source, path, Some(path), &mut |_, _| true)
    }

    fn comments(page: &Page) -> Vec<&Comment> {
        page.steps()
            .iter()
            .flat_map(|s| s.elements.iter())
            .filter_map(Element::as_comment)
            .collect()
    }

    #[test]
    fn header_and_title() {
        let source = "0 Brick 2 x 4\n\
                      0 Name: 3001.dat\n\
                      0 Author: James Jessiman\n\
                      0 !LDRAW_ORG Part UPDATE 2004-03\n\
                      0 !LICENSE Redistributable under CCAL version 2.0\n\
                      0 BFC CERTIFY CCW\n\
                      0 !HISTORY 2002-08-18 [PTadmin] Official Update 2002-03\n\
                      0 !HISTORY 2007-07-25 [PTadmin] Header formatted\n\
                      \n\
                      1 16 0 0 0 1 0 0 0 1 0 0 0 1 s\\3001s01.dat\n";
        let page = parse(source, "/lib/parts/3001.dat").unwrap();
        let header = page.header();
        assert_eq!(header.title.as_deref(), Some("Brick 2 x 4"));
        assert_eq!(header.name, "3001");
        assert_eq!(header.author.as_deref(), Some("James Jessiman"));
        assert_eq!(header.page_type, PageType::Part);
        assert!(header.type_declared);
        assert_eq!(header.history.len(), 2);
        assert_eq!(
            header.bfc,
            crate::model::BfcCertification::Certified(crate::model::Winding::Ccw)
        );
        drop(header);
        assert_eq!(page.target_name(), "3001.dat");
        assert_eq!(page.category().as_deref(), Some("Brick"));
        let references = page.references();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].target_name(), "s\\3001s01.dat");
        assert!(page.diagnostics().is_empty());
    }

    #[test]
    fn keywords_depend_on_page_type() {
        let source = "0 Some part\n0 !KEYWORDS a, b\n";
        let part = parse(source, "/lib/parts/x.dat").unwrap();
        assert_eq!(part.keywords(), vec!["a".to_string(), "b".to_string()]);
        assert!(comments(&part).is_empty());

        let subpart = parse(source, "/lib/parts/s/x.dat").unwrap();
        assert!(subpart.keywords().is_empty());
        let deactivated = comments(&subpart);
        assert_eq!(deactivated.len(), 1);
        assert_eq!(deactivated[0].text, "0 !KEYWORDS a, b");
        assert!(deactivated[0].is_deactivated());
        assert_eq!(subpart.diagnostics().len(), 1);
        assert_eq!(subpart.diagnostics()[0].line_number(), 2);
    }

    #[test]
    fn keywords_accumulate_across_lines() {
        let source = "0 Some part\n0 !KEYWORDS foo, bar\n0 !KEYWORDS baz\n";
        let part = parse(source, "/lib/parts/x.dat").unwrap();
        assert_eq!(part.keywords(), vec!["foo", "bar", "baz"]);
        assert!(comments(&part).is_empty());

        let subpart = parse(source, "/lib/parts/s/x.dat").unwrap();
        assert!(subpart.keywords().is_empty());
        let texts: Vec<_> = comments(&subpart)
            .iter()
            .filter(|c| c.is_deactivated())
            .map(|c| c.text.clone())
            .collect();
        assert_eq!(texts, vec!["0 !KEYWORDS foo, bar", "0 !KEYWORDS baz"]);
        assert_eq!(subpart.diagnostics().len(), 2);
    }

    #[test]
    fn duplicate_and_late_properties_are_deactivated() {
        let source = "0 Title\n\
                      0 Author: A\n\
                      0 Author: B\n\
                      2 24 0 0 0 1 1 1\n\
                      0 !LICENSE late\n";
        let page = parse(source, "m.ldr").unwrap();
        assert_eq!(page.header().author.as_deref(), Some("A"));
        let texts: Vec<_> = comments(&page)
            .iter()
            .filter(|c| c.is_deactivated())
            .map(|c| c.text.clone())
            .collect();
        assert_eq!(texts, vec!["0 Author: B", "0 !LICENSE late"]);
    }

    #[test]
    fn steps_and_rotation() {
        let source = "0 Model\n\
                      1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                      0 STEP\n\
                      1 4 0 -24 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                      0 ROTSTEP 0 90 0 ABS\n\
                      1 4 0 -48 0 1 0 0 0 1 0 0 0 1 3001.dat\n\
                      \n\
                      0\n";
        let page = parse(source, "m.ldr").unwrap();
        let steps = page.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].rotation, None);
        assert_eq!(
            steps[1].rotation,
            Some(StepRotation::Absolute(Vertex::new(0.0, 90.0, 0.0)))
        );
        // Trailing blank lines are trimmed.
        assert_eq!(steps[2].elements.len(), 1);
    }

    #[test]
    fn modifiers_attach_once() {
        let source = "0 Model\n\
                      0 BFC INVERTNEXT\n\
                      0 !LOCKNEXT\n\
                      0 !LOCKNEXT\n\
                      1 16 0 0 0 1 0 0 0 1 0 0 0 1 a.dat\n\
                      1 16 0 0 0 1 0 0 0 1 0 0 0 1 b.dat\n\
                      0 BFC INVERTNEXT\n\
                      3 16 0 0 0 1 0 0 0 1 0\n\
                      0 !HIDENEXT\n";
        let page = parse(source, "m.ldr").unwrap();
        let references = page.references();
        assert!(references[0].inverted);
        assert!(references[0].flags.contains(ElementFlag::Locked));
        assert!(!references[1].inverted);
        assert!(references[1].flags.is_empty());

        let deactivated: Vec<_> = comments(&page)
            .into_iter()
            .filter(|c| c.is_deactivated())
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(
            deactivated,
            vec!["0 !LOCKNEXT", "0 BFC INVERTNEXT", "0 !HIDENEXT"]
        );
    }

    #[test]
    fn groups_nest_and_orphans_attach_to_last_step() {
        let source = "0 Model\n\
                      0 !LEOCAD GROUP BEGIN Outer\n\
                      0 !LEOCAD GROUP BEGIN Inner\n\
                      2 24 0 0 0 1 1 1\n\
                      0 !LEOCAD GROUP END\n\
                      0 !LEOCAD GROUP END\n\
                      0 !LEOCAD GROUP END\n\
                      0 STEP\n\
                      0 !LEOCAD GROUP BEGIN Open\n\
                      2 24 0 0 0 1 1 1\n";
        let page = parse(source, "m.ldr").unwrap();
        let steps = page.steps();
        assert_eq!(steps.len(), 2);
        let Element::Group(outer) = &steps[0].elements[0] else {
            panic!("expected group, got {:?}", steps[0].elements[0]);
        };
        assert_eq!(outer.name, "Outer");
        let Element::Group(inner) = &outer.elements[0] else {
            panic!("expected nested group");
        };
        assert_eq!(inner.name, "Inner");
        assert_eq!(inner.elements.len(), 1);
        // The unmatched END survives as a deactivated comment.
        assert!(matches!(
            &steps[0].elements[1],
            Element::Comment(Comment { kind: CommentKind::Deactivated { .. }, .. })
        ));
        let Element::Group(open) = steps[1].elements.last().unwrap() else {
            panic!("orphaned group not attached");
        };
        assert_eq!(open.name, "Open");
        assert_eq!(open.elements.len(), 1);
    }

    #[test]
    fn texture_blocks() {
        let source = "0 Model\n\
                      0 !TEXMAP START PLANAR 0 0 0 1 0 0 0 1 0 \"my logo.png\" GLOSSMAP gloss.png\n\
                      0 !: 3 16 0 0 0 1 0 0 0 1 0\n\
                      0 !TEXMAP FALLBACK\n\
                      3 16 0 0 0 1 0 0 0 1 0\n\
                      0 !TEXMAP END\n\
                      0 !TEXMAP NEXT CYLINDRICAL 0 0 0 1 0 0 0 1 0 90 tex.png\n\
                      4 16 0 0 0 1 0 0 1 1 0 0 1 0\n\
                      2 24 0 0 0 1 1 1\n\
                      0 !: 2 24 0 0 0 1 1 1\n";
        let page = parse(source, "m.ldr").unwrap();
        let elements = &page.steps()[0].elements;
        let Element::TexMap(block) = &elements[0] else {
            panic!("expected texture block");
        };
        assert_eq!(block.texture, "my logo.png");
        assert_eq!(block.glossmap.as_deref(), Some("gloss.png"));
        assert_eq!(block.form, TexMapForm::Block);
        assert_eq!(block.textured.len(), 1);
        assert_eq!(block.fallback.len(), 1);

        let Element::TexMap(next) = &elements[1] else {
            panic!("expected inline texture");
        };
        assert_eq!(next.form, TexMapForm::Next);
        assert!(matches!(next.projection, Projection::Cylindrical { angle, .. } if angle == 90.0));
        assert_eq!(next.textured.len(), 1);
        assert!(matches!(elements[2], Element::Line(_)));
        // `!:` outside a block is deactivated.
        assert!(matches!(&elements[3], Element::Comment(c) if c.is_deactivated()));
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let source = "0 Model\n1 16 0 0 0 1 0 0 0 1 0 0 0 1\n";
        let err = parse(source, "broken.ldr").unwrap_err();
        assert!(matches!(
            err,
            LDrawError::Syntax { line_number: 2, ref path, .. } if path == "broken.ldr"
        ));

        let err = parse("0 Model\n\n2 24 0 0 0 x 1 1\n", "broken.ldr").unwrap_err();
        assert!(matches!(err, LDrawError::Syntax { line_number: 3, .. }));

        let err = parse("0 Model\n0 ROTSTEP 0 ninety 0\n", "broken.ldr").unwrap_err();
        assert!(matches!(err, LDrawError::Syntax { line_number: 2, .. }));

        let err = parse(
            "0 Model\n0 !TEXMAP START PLANAR 0 0 0 1 0 0 0 1\n",
            "broken.ldr",
        )
        .unwrap_err();
        assert!(matches!(err, LDrawError::Syntax { line_number: 2, .. }));
    }

    #[test]
    fn unknown_lines_degrade_to_comments() {
        let page = parse("0 Model\n7 what is this\n0 BFC SIDEWAYS\n", "m.ldr").unwrap();
        let all = comments(&page);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.is_deactivated()));
        assert_eq!(all[0].text, "7 what is this");
    }

    #[test]
    fn legacy_commands() {
        let page = parse("0 Model\n0 PAUSE\n0 WRITE hi there\n", "m.ldr").unwrap();
        let elements = &page.steps()[0].elements;
        assert!(matches!(elements[0], Element::Meta(MetaCommand::Pause)));
        assert!(matches!(&elements[1], Element::Meta(MetaCommand::Write(m)) if m == "hi there"));
    }

    #[test]
    fn cancellation() {
        let source = "0 Model\n2 24 0 0 0 1 1 1\n2 24 0 0 0 1 1 1\n2 24 0 0 0 1 1 1\n";
        let mut seen = Vec::new();
        let result = PageParser::parse(source, "m.ldr", None, &mut |kind, percent| {
            seen.push((kind.to_string(), percent));
            seen.len() < 2
        });
        assert_eq!(result.err(), Some(LDrawError::OperationCancelled));
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(kind, p)| kind == "line" && *p <= 50));
    }

    #[test]
    fn stops_at_file_and_nofile() {
        let source = "0 FILE main.ldr\n\
                      0 Main\n\
                      1 16 0 0 0 1 0 0 0 1 0 0 0 1 sub.ldr\n\
                      0 FILE sub.ldr\n\
                      0 Sub\n";
        let mut cursor = LineCursor::new(source);
        let main = PageParser::parse_next(&mut cursor, "x.mpd", Some("x.mpd"), &mut |_, _| true)
            .unwrap();
        assert_eq!(main.target_name(), "main.ldr");
        assert_eq!(cursor.peek().map(|l| l.number), Some(4));

        let mut cursor = LineCursor::new("0 A\n0 NOFILE\n0 B\n");
        let page =
            PageParser::parse_next(&mut cursor, "a.ldr", Some("a.ldr"), &mut |_, _| true).unwrap();
        assert_eq!(page.title().as_deref(), Some("A"));
        assert_eq!(cursor.peek().map(|l| l.number), Some(3));
    }
}
